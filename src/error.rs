//! # `osc_live_preview` Error module
//!
//! Provides abstractions over errors which can occur during this crate's use.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::PathBuf;

use serde_any;
use thiserror;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Result type used by faillible functions inside the `osc_live_preview` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents errors which can occur during use of the `osc_live_preview` crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Could not obtain a camera session: {0}")]
    SessionNegotiation(String),

    #[error("Camera command failed: {0}")]
    Command(String),

    #[error("Live preview connection failed: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Error occured while converting an image: {0}")]
    ImageConversionError(image::ImageError),

    #[error("Unsupported image format {0:?}")]
    ImageFormatError(String),

    #[error("Live preview start was superseded by a newer start or stop")]
    Superseded,

    #[error("Cannot find file at {0:?}")]
    FileNotFound(PathBuf),

    #[error("Error deserialising data: {0}")]
    DeserialisationError(serde_any::Error),

    #[error("Cannot build live preview: {0}")]
    BuildError(String)
}
