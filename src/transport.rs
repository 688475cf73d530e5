//! # Transport Module
//!
//! A transport opens the streaming request and reports what happens on the connection as a
//! sequence of [`TransportEvent`]s. Events are fed to the live preview through an [`EventSink`]
//! stamped with the generation of the connection, so events from a replaced or cancelled
//! connection are recognised and ignored.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::sync::Weak;

use crate::error::{Error, Result};
use crate::livepreview::Generation;
use crate::session::RequestDescriptor;

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Opens live preview connections.
pub trait Transport: Send + Sync {
    /// Open the request, delivering events for the connection to `sink`.
    ///
    /// Events must be delivered asynchronously, never from inside `open`. Failures once the
    /// connection is underway are reported as `TransportEvent::Completed(Some(..))`.
    fn open(&self, request: RequestDescriptor, sink: EventSink) -> Result<Box<dyn ConnectionHandle>>;
}

/// An open connection.
pub trait ConnectionHandle: Send {
    /// Request cancellation of the connection.
    ///
    /// Events already in flight may still be delivered after this returns, but none may be
    /// delivered from inside `cancel` itself.
    fn cancel(&self);
}

/// Receiver of connection events, implemented by the live preview.
pub(crate) trait EventTarget: Send + Sync {
    fn handle_event(&self, generation: Generation, event: TransportEvent);
}

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Something which happened on a live preview connection.
#[derive(Debug)]
pub enum TransportEvent {
    /// A new part of the multipart response has started
    Boundary,

    /// A chunk of the current part
    Data(Vec<u8>),

    /// The connection ended, with the error if it failed
    Completed(Option<Error>)
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTS
// -----------------------------------------------------------------------------------------------

/// The entry point for a single connection's events.
#[derive(Clone)]
pub struct EventSink {
    target: Weak<dyn EventTarget>,

    generation: Generation
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl EventSink {
    pub(crate) fn new(target: Weak<dyn EventTarget>, generation: Generation) -> Self {
        Self { target, generation }
    }

    /// The generation of the connection this sink belongs to.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Feed an event into the live preview.
    ///
    /// Does nothing once the live preview has been dropped.
    pub fn send(&self, event: TransportEvent) {
        if let Some(target) = self.target.upgrade() {
            target.handle_event(self.generation, event);
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .finish()
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {

    use super::*;
    use std::sync::{Arc, Mutex};

    /// What a [`Recorder`] saw, with errors flattened so records can be compared.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Record {
        Boundary,
        Data(Vec<u8>),
        Completed(bool)
    }

    /// Records every event it is sent.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub(crate) records: Mutex<Vec<(Generation, Record)>>
    }

    impl Recorder {
        pub(crate) fn records(&self) -> Vec<(Generation, Record)> {
            self.records.lock().expect("Recorder poisoned").clone()
        }
    }

    impl EventTarget for Recorder {
        fn handle_event(&self, generation: Generation, event: TransportEvent) {
            let record = match event {
                TransportEvent::Boundary => Record::Boundary,
                TransportEvent::Data(d) => Record::Data(d),
                TransportEvent::Completed(e) => Record::Completed(e.is_some())
            };
            self.records.lock().expect("Recorder poisoned").push((generation, record));
        }
    }

    pub(crate) fn sink_for(recorder: &Arc<Recorder>, generation: Generation) -> EventSink {
        let target: Arc<dyn EventTarget> = recorder.clone();
        EventSink::new(Arc::downgrade(&target), generation)
    }

    /// Test that events are stamped with the sink's generation
    #[test]
    fn test_sink_stamps_generation() {
        let recorder = Arc::new(Recorder::default());
        let sink = sink_for(&recorder, Generation::from(7));

        sink.send(TransportEvent::Boundary);
        sink.clone().send(TransportEvent::Data(vec![1, 2, 3]));

        assert_eq!(sink.generation(), Generation::from(7));
        assert_eq!(recorder.records(), vec![
            (Generation::from(7), Record::Boundary),
            (Generation::from(7), Record::Data(vec![1, 2, 3]))
        ]);
    }

    /// Test that a sink outliving its target drops events
    #[test]
    fn test_sink_after_target_dropped() {
        let recorder = Arc::new(Recorder::default());
        let sink = sink_for(&recorder, Generation::from(1));
        drop(recorder);

        sink.send(TransportEvent::Completed(None));
    }
}
