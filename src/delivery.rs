//! # Delivery Module
//!
//! All application callbacks run on one dedicated delivery thread, in the order they were
//! queued. Each queued delivery carries the generation it was produced for and is only invoked
//! if that generation is still current when its turn comes.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use log::trace;

use crate::frame::Frame;
use crate::livepreview::{FrameCallback, Generation};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTS
// -----------------------------------------------------------------------------------------------

/// A callback invocation waiting to run.
struct Delivery {
    generation: Generation,
    callback: FrameCallback,
    frame: Option<Frame>
}

/// The delivery thread and the means to feed and synchronise with it.
pub(crate) struct DeliveryContext {
    tx: Mutex<Option<Sender<Delivery>>>,

    /// Held for the whole of each callback invocation
    gate: Arc<Mutex<()>>,

    thread_id: ThreadId,

    handle: Mutex<Option<JoinHandle<()>>>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl DeliveryContext {
    /// Start the delivery thread.
    ///
    /// `is_current` is consulted, with the gate held, before every invocation.
    pub(crate) fn spawn<F>(is_current: F) -> Self
    where
        F: Fn(Generation) -> bool + Send + 'static
    {
        let (tx, rx) = channel::<Delivery>();
        let gate = Arc::new(Mutex::new(()));

        let thread_gate = gate.clone();
        let handle = thread::spawn(move || {
            while let Ok(delivery) = rx.recv() {
                let _gate = lock(&thread_gate);

                if !is_current(delivery.generation) {
                    trace!("Skipping delivery for stale generation {}", delivery.generation);
                    continue;
                }

                (delivery.callback)(delivery.frame);
            }
        });

        Self {
            tx: Mutex::new(Some(tx)),
            gate,
            thread_id: handle.thread().id(),
            handle: Mutex::new(Some(handle))
        }
    }

    /// Queue a callback invocation.
    pub(crate) fn deliver(&self, generation: Generation, callback: FrameCallback, frame: Option<Frame>) {
        if let Some(tx) = lock(&self.tx).as_ref() {
            let _ = tx.send(Delivery { generation, callback, frame });
        }
    }

    /// Wait for any callback currently running to return.
    ///
    /// Returns immediately when called from inside a callback.
    pub(crate) fn drain(&self) {
        if thread::current().id() != self.thread_id {
            drop(lock(&self.gate));
        }
    }

    /// Stop accepting deliveries and wait for the thread to finish what is queued.
    pub(crate) fn shutdown(&self) {
        lock(&self.tx).take();

        let handle = lock(&self.handle).take();
        if let Some(handle) = handle {
            if thread::current().id() != self.thread_id {
                let _ = handle.join();
            }
        }
    }
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Lock a mutex, carrying on if a callback panicked while it was held.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
