//! # Live Preview Module
//!
//! The live preview keeps a stream of frames flowing from the camera to a callback. Starting it
//! negotiates a session, switches the camera to image capture mode and opens the streaming
//! request. When the connection ends without the preview having been stopped, the callback is
//! told the stream dropped and the whole start sequence is repeated after a fixed delay.
//!
//! Every start, restart and stop moves the preview to a new [`Generation`]. Connections and
//! restart timers remember the generation they were created for, and anything arriving for an
//! old generation is ignored. Queued deliveries are stamped with a separate subscription
//! generation, which only moves when the callback is replaced or removed, so frames and the
//! stream-ended signal survive an automatic restart.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use derive_more::{Display, From};
use log::{debug, info, trace, warn};

use crate::delivery::DeliveryContext;
use crate::error::{Error, Result};
use crate::extractor::{self, FrameExtractor};
use crate::frame::{Frame, FrameDecoder};
use crate::scheduler::{RestartScheduler, TaskHandle};
use crate::session::{CaptureMode, Command, CommandExecutor, SessionManager};
use crate::transport::{ConnectionHandle, EventSink, EventTarget, Transport, TransportEvent};

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Callback receiving each decoded frame, or `None` whenever the stream drops.
pub type FrameCallback = Arc<dyn Fn(Option<Frame>) + Send + Sync>;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// The state of the live preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StreamState {
    /// Not running
    Stopped,

    /// Starting, or waiting to restart, and no frame decoded on the current connection yet
    Connecting,

    /// At least one frame has been decoded
    Streaming
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTS
// -----------------------------------------------------------------------------------------------

/// Token identifying the currently authorised connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Display, From)]
pub struct Generation(u64);

/// Continuous live preview from a camera.
///
/// Build one with [`LivePreviewBuilder`](crate::LivePreviewBuilder).
pub struct LivePreview {
    shared: Arc<Shared>
}

/// State shared between the controlling thread, connection threads, restart timers and the
/// delivery thread.
struct Shared {
    session: Mutex<PreviewSession>,

    sessions: Arc<dyn SessionManager>,
    commands: Arc<dyn CommandExecutor>,
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn FrameDecoder>,

    scheduler: RestartScheduler,
    delivery: DeliveryContext,

    me: Weak<Shared>
}

/// Everything about the preview which changes over its lifetime.
struct PreviewSession {
    generation: Generation,

    /// Advanced by `stop` and by caller-initiated starts, kept by automatic restarts
    subscription: Generation,

    state: StreamState,

    callback: Option<FrameCallback>,

    /// Notified, and restarted with, when the connection ends
    on_ended: Option<FrameCallback>,

    connection: Option<Box<dyn ConnectionHandle>>,

    extractor: FrameExtractor,

    restart: Option<TaskHandle>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Generation {
    pub fn value(&self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }
}

impl LivePreview {
    pub(crate) fn new(
        sessions: Arc<dyn SessionManager>,
        commands: Arc<dyn CommandExecutor>,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn FrameDecoder>,
        scheduler: RestartScheduler
    ) -> Self {
        let shared = Arc::new_cyclic(|me: &Weak<Shared>| {
            let delivery_ref = me.clone();
            let delivery = DeliveryContext::spawn(move |generation| {
                delivery_ref
                    .upgrade()
                    .map_or(false, |shared| {
                        let current = shared.lock().subscription;
                        current == generation
                    })
            });

            Shared {
                session: Mutex::new(PreviewSession::new()),
                sessions,
                commands,
                transport,
                decoder,
                scheduler,
                delivery,
                me: me.clone()
            }
        });

        Self { shared }
    }

    /// Start, or restart, the live preview.
    ///
    /// Any previous connection is cancelled and its callback will not be called again. Blocks
    /// while the session is negotiated and the capture mode set, returning the error if either
    /// fails or if the stream cannot be opened. Returns [`Error::Superseded`] if another
    /// `start` or a `stop` happened before the stream was opened.
    pub fn start<F>(&self, on_frame: F) -> Result<()>
    where
        F: Fn(Option<Frame>) + Send + Sync + 'static
    {
        self.shared.start(Arc::new(on_frame), None)
    }

    /// Stop the live preview.
    ///
    /// Once this returns the callback will not be called again, unless this is called from
    /// within the callback itself, in which case only the current invocation may still be
    /// running. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        self.shared.stop();
    }

    /// The current state of the preview.
    pub fn state(&self) -> StreamState {
        self.shared.lock().state
    }

    /// The current generation.
    pub fn generation(&self) -> Generation {
        self.shared.lock().generation
    }

    /// The delay between a connection ending and the restart attempt.
    pub fn restart_delay(&self) -> Duration {
        self.shared.scheduler.delay()
    }
}

impl Drop for LivePreview {
    fn drop(&mut self) {
        self.shared.stop();
        self.shared.delivery.shutdown();
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, PreviewSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run the start sequence.
    ///
    /// With `expected` set the start only goes ahead if that generation is still current, which
    /// is how restarts avoid overriding a stop that raced with the restart timer.
    fn start(&self, callback: FrameCallback, expected: Option<Generation>) -> Result<()> {
        let generation = {
            let mut session = self.lock();

            if let Some(expected) = expected {
                if session.generation != expected {
                    return Err(Error::Superseded);
                }
            }

            session.supersede();
            if expected.is_none() {
                session.subscription = session.subscription.next();
            }
            session.state = StreamState::Connecting;

            info!("Live preview connecting, generation {}", session.generation);
            session.generation
        };

        let result = self.open_stream(generation, callback);

        if let Err(ref e) = result {
            match e {
                Error::Superseded => debug!("Live preview start for generation {} superseded", generation),
                _ => self.abandon(generation)
            }
        }

        result
    }

    /// Negotiate the session, set the capture mode and open the stream, bailing out as soon as
    /// the generation is superseded.
    fn open_stream(&self, generation: Generation, callback: FrameCallback) -> Result<()> {
        let session = self.sessions.current_session()?;
        self.ensure_current(generation)?;

        self.commands.execute(&Command::set_capture_mode(&session, CaptureMode::Image))?;
        self.ensure_current(generation)?;

        let request = self.commands.live_preview_request(&session);

        // Register the callback first, events may arrive as soon as the stream is open
        {
            let mut state = self.lock();
            if state.generation != generation {
                return Err(Error::Superseded);
            }
            state.callback = Some(callback.clone());
            state.on_ended = Some(callback);
        }

        let target: Weak<dyn EventTarget> = self.me.clone();
        let connection = self.transport.open(request, EventSink::new(target, generation))?;

        let mut state = self.lock();
        if state.generation != generation {
            connection.cancel();
            return Err(Error::Superseded);
        }
        state.connection = Some(connection);

        debug!("Live preview stream opened for session {}", session.id);
        Ok(())
    }

    fn ensure_current(&self, generation: Generation) -> Result<()> {
        if self.lock().generation == generation {
            Ok(())
        } else {
            Err(Error::Superseded)
        }
    }

    /// Give up on a failed start, leaving the preview stopped.
    fn abandon(&self, generation: Generation) {
        let mut session = self.lock();

        if session.generation == generation {
            session.callback = None;
            session.on_ended = None;
            session.connection = None;
            session.state = StreamState::Stopped;
        }
    }

    fn stop(&self) {
        let (connection, restart) = {
            let mut session = self.lock();

            if session.state != StreamState::Stopped {
                info!("Live preview stopped");
            }

            session.generation = session.generation.next();
            session.subscription = session.subscription.next();
            session.callback = None;
            session.on_ended = None;
            session.extractor.reset();
            session.state = StreamState::Stopped;

            (session.connection.take(), session.restart.take())
        };

        if let Some(connection) = connection {
            connection.cancel();
        }
        if let Some(restart) = restart {
            restart.cancel();
        }

        self.delivery.drain();
    }

    fn on_boundary(&self, generation: Generation) {
        let part = {
            let mut session = self.lock();
            if session.generation != generation {
                trace!("Ignoring boundary from stale generation {}", generation);
                return;
            }
            session.extractor.take_part()
        };

        let frame = match part.and_then(|p| extractor::decode_part(&*self.decoder, p)) {
            Some(frame) => frame,
            None => return
        };

        let mut session = self.lock();
        if session.generation != generation {
            return;
        }

        if session.state == StreamState::Connecting {
            session.state = StreamState::Streaming;
            info!("Live preview streaming, generation {}", generation);
        }

        if let Some(callback) = session.callback.clone() {
            self.delivery.deliver(session.subscription, callback, Some(frame));
        }
    }

    fn on_data(&self, generation: Generation, data: Vec<u8>) {
        let mut session = self.lock();

        if session.generation != generation {
            trace!("Ignoring {} bytes from stale generation {}", data.len(), generation);
            return;
        }

        session.extractor.push_data(&data);
    }

    fn on_completed(&self, generation: Generation, error: Option<Error>) {
        let mut session = self.lock();

        if session.generation != generation {
            return;
        }

        match error {
            Some(e) => warn!("Live preview connection failed: {}", e),
            None => info!("Live preview connection ended")
        }

        session.connection = None;
        session.extractor.reset();

        let callback = match session.on_ended.take() {
            Some(callback) => callback,
            None => return
        };

        self.delivery.deliver(session.subscription, callback.clone(), None);
        session.state = StreamState::Connecting;

        debug!("Restarting live preview in {:?}", self.scheduler.delay());
        let me = self.me.clone();
        session.restart = Some(self.scheduler.schedule(move || {
            if let Some(shared) = me.upgrade() {
                shared.restart(generation, callback);
            }
        }));
    }

    fn restart(&self, generation: Generation, callback: FrameCallback) {
        match self.start(callback, Some(generation)) {
            Ok(()) => (),
            Err(Error::Superseded) => trace!("Restart for generation {} cancelled", generation),
            Err(e) => warn!("Live preview restart failed: {}", e)
        }
    }
}

impl EventTarget for Shared {
    fn handle_event(&self, generation: Generation, event: TransportEvent) {
        match event {
            TransportEvent::Boundary => self.on_boundary(generation),
            TransportEvent::Data(data) => self.on_data(generation, data),
            TransportEvent::Completed(error) => self.on_completed(generation, error)
        }
    }
}

impl PreviewSession {
    fn new() -> Self {
        Self {
            generation: Generation::default(),
            subscription: Generation::default(),
            state: StreamState::Stopped,
            callback: None,
            on_ended: None,
            connection: None,
            extractor: FrameExtractor::new(),
            restart: None
        }
    }

    /// Move to a new generation, cancelling everything belonging to the old one.
    fn supersede(&mut self) {
        self.generation = self.generation.next();
        self.callback = None;
        self.on_ended = None;
        self.extractor.reset();

        if let Some(connection) = self.connection.take() {
            connection.cancel();
        }
        if let Some(restart) = self.restart.take() {
            restart.cancel();
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
