//! # Frame Extractor Module
//!
//! Accumulates the bytes of the current multipart part and hands the whole part over each time
//! the transport announces a new one. A part is never carried across a boundary: whatever has
//! been accumulated is taken at the boundary, whether or not it turns out to be decodable.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;

use crate::frame::{Frame, FrameDecoder};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTS
// -----------------------------------------------------------------------------------------------

/// Byte accumulator for the part currently being received.
#[derive(Debug, Default)]
pub struct FrameExtractor {
    buffer: Vec<u8>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl FrameExtractor {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append a chunk of the current part.
    pub fn push_data(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Handle a boundary signal.
    ///
    /// Returns the bytes accumulated for the finished part, or `None` if nothing was received.
    /// The buffer is always left empty.
    pub fn take_part(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }

        Some(std::mem::take(&mut self.buffer))
    }

    /// Discard anything accumulated so far.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// -----------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Decode a finished part into a frame.
///
/// Parts which do not form a complete image are dropped.
pub fn decode_part(decoder: &dyn FrameDecoder, part: Vec<u8>) -> Option<Frame> {
    match decoder.decode(&part) {
        Ok(image) => Some(Frame::new(part, image)),
        Err(e) => {
            debug!("Dropping undecodable {} byte part: {}", part.len(), e);
            None
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
