//! # Frame Module
//!
//! Frames are the complete images extracted from the live preview stream, one per multipart
//! part. Decoding the raw bytes of a part is delegated to a [`FrameDecoder`], by default
//! [`ImageFrameDecoder`] which is backed by the `image` crate.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::{Error, Result};

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Turns the bytes of a single part into an image.
pub trait FrameDecoder: Send + Sync {
    /// Decode `data` as one complete image, failing if the bytes are truncated or invalid.
    fn decode(&self, data: &[u8]) -> Result<DynamicImage>;
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTS
// -----------------------------------------------------------------------------------------------

/// A decoded frame from the live preview stream.
#[derive(Clone)]
pub struct Frame {
    /// The raw bytes of the part the frame was decoded from
    data: Vec<u8>,

    /// The decoded image
    image: DynamicImage
}

/// Decoder using `image::load_from_memory`, optionally pinned to one format.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFrameDecoder {
    format: Option<ImageFormat>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Frame {
    pub(crate) fn new(data: Vec<u8>, image: DynamicImage) -> Self {
        Self { data, image }
    }

    /// The raw bytes of the part this frame was decoded from.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The decoded image.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Consume the frame, returning the decoded image.
    pub fn into_image(self) -> DynamicImage {
        self.image
    }

    /// Get the width of the frame
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Get the height of the frame
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &self.data.len())
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl ImageFrameDecoder {
    /// Create a decoder which guesses the format of every part.
    pub fn new() -> Self {
        Self { format: None }
    }

    /// Create a decoder which only accepts parts in the given format.
    pub fn with_format(format: ImageFormat) -> Self {
        Self { format: Some(format) }
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }
}

impl FrameDecoder for ImageFrameDecoder {
    fn decode(&self, data: &[u8]) -> Result<DynamicImage> {
        let img = match self.format {
            Some(format) => image::load_from_memory_with_format(data, format),
            None => image::load_from_memory(data)
        };

        img.map_err(Error::ImageConversionError)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
