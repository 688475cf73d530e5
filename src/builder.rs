//! # `LivePreviewBuilder` implementation
//!
//! This module implements the builder for live preview objects, and the configuration which can
//! be loaded into it from a file.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::ImageFormat;
use serde::Deserialize;
use serde_any;

use crate::error::{Error, Result};
use crate::frame::{FrameDecoder, ImageFrameDecoder};
use crate::http::{HttpTransport, DEFAULT_IDLE_TIMEOUT};
use crate::livepreview::LivePreview;
use crate::scheduler::{RestartScheduler, DEFAULT_RESTART_DELAY};
use crate::session::{CommandExecutor, SessionManager};
use crate::transport::Transport;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Live preview settings which can be loaded from a file.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PreviewConfig {
    /// Milliseconds between a connection ending and the restart attempt
    pub restart_delay_ms: u64,

    /// Milliseconds the default HTTP transport waits for data before failing the connection
    pub idle_timeout_ms: u64,

    /// Name of the only image format frames are decoded as, any format if not given
    pub image_format: Option<String>
}

/// Builder for [`LivePreview`].
pub struct LivePreviewBuilder {
    sessions: Option<Arc<dyn SessionManager>>,
    commands: Option<Arc<dyn CommandExecutor>>,
    transport: Option<Arc<dyn Transport>>,
    decoder: Option<Arc<dyn FrameDecoder>>,

    restart_delay: Duration,
    idle_timeout: Duration,

    img_format: Option<ImageFormat>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            restart_delay_ms: DEFAULT_RESTART_DELAY.as_millis() as u64,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT.as_millis() as u64,
            image_format: None
        }
    }
}

impl LivePreviewBuilder {
    pub fn new() -> Self {
        Self {
            sessions: None,
            commands: None,
            transport: None,
            decoder: None,
            restart_delay: DEFAULT_RESTART_DELAY,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            img_format: None
        }
    }

    /// Set the session manager used to negotiate the camera session. Required.
    pub fn session_manager(mut self, sessions: Arc<dyn SessionManager>) -> Self {
        self.sessions = Some(sessions);

        self
    }

    /// Set the executor used for camera commands. Required.
    pub fn command_executor(mut self, commands: Arc<dyn CommandExecutor>) -> Self {
        self.commands = Some(commands);

        self
    }

    /// Set the transport used to open the stream.
    ///
    /// Defaults to an [`HttpTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);

        self
    }

    /// Set the decoder used to turn parts into images.
    ///
    /// Defaults to an [`ImageFrameDecoder`] for the format set with
    /// [`image_format`](Self::image_format), if any. Overrides the image format.
    pub fn decoder(mut self, decoder: Arc<dyn FrameDecoder>) -> Self {
        self.decoder = Some(decoder);

        self
    }

    /// Set the delay between a connection ending and the restart attempt.
    ///
    /// Default value is 5 seconds.
    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.restart_delay = delay;

        self
    }

    /// Set how long the default transport waits for data before failing the connection.
    ///
    /// Default value is 60 seconds. Has no effect when a transport is given.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;

        self
    }

    /// Only decode frames in the named format.
    ///
    /// Accepts `jpeg`, `jpg`, `mjpg` and `png`.
    pub fn image_format(mut self, format: &str) -> Result<Self> {
        self.img_format = Some(
            format_from_name(format).ok_or_else(|| Error::ImageFormatError(format.to_string()))?
        );

        Ok(self)
    }

    /// Apply a configuration.
    pub fn config(mut self, config: PreviewConfig) -> Result<Self> {
        self.restart_delay = Duration::from_millis(config.restart_delay_ms);
        self.idle_timeout = Duration::from_millis(config.idle_timeout_ms);

        match config.image_format {
            Some(ref format) => self.image_format(format),
            None => Ok(self)
        }
    }

    /// Load the configuration from a file.
    ///
    /// The file type will be guessed at runtime, any file type supported by
    /// [`serde_any`](https://docs.rs/serde_any/0.5.0/serde_any/) is supported, but it must be
    /// deserialisable into [`PreviewConfig`].
    pub fn config_from_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        // Check the file exists
        if !path.as_ref().exists() {
            return Err(Error::FileNotFound(path.as_ref().to_path_buf()));
        }

        let config = serde_any::from_file(path)
            .map_err(Error::DeserialisationError)?;

        self.config(config)
    }

    /// Build the live preview object.
    ///
    /// This function can fail if a required collaborator is missing or the default transport
    /// cannot be created.
    pub fn build(self) -> Result<LivePreview> {
        let sessions = self.sessions
            .ok_or_else(|| Error::BuildError(String::from("Missing session manager")))?;
        let commands = self.commands
            .ok_or_else(|| Error::BuildError(String::from("Missing command executor")))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::with_idle_timeout(self.idle_timeout)?)
        };

        let img_format = self.img_format;
        let decoder: Arc<dyn FrameDecoder> = self.decoder.unwrap_or_else(|| match img_format {
            Some(format) => Arc::new(ImageFrameDecoder::with_format(format)),
            None => Arc::new(ImageFrameDecoder::new())
        });

        Ok(LivePreview::new(
            sessions,
            commands,
            transport,
            decoder,
            RestartScheduler::new(self.restart_delay)
        ))
    }
}

impl Default for LivePreviewBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn format_from_name(format: &str) -> Option<ImageFormat> {
    match format.to_ascii_lowercase().as_str() {
        "jpeg" | "jpg" | "mjpg" => Some(ImageFormat::Jpeg),
        "png" => Some(ImageFormat::Png),
        _ => None
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {

    use super::*;
    use crate::session::{Command, Method, RequestDescriptor, Session};

    struct NullCamera;

    impl SessionManager for NullCamera {
        fn current_session(&self) -> Result<Session> {
            Ok(Session::new("SID_0001"))
        }
    }

    impl CommandExecutor for NullCamera {
        fn execute(&self, _command: &Command) -> Result<()> {
            Ok(())
        }

        fn live_preview_request(&self, _session: &Session) -> RequestDescriptor {
            RequestDescriptor::new(Method::Post, "http://127.0.0.1/osc/commands/execute")
        }
    }

    #[test]
    fn test_format_from_name() {
        assert_eq!(format_from_name("MJPG"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_name("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(format_from_name("png"), Some(ImageFormat::Png));
        assert_eq!(format_from_name("YUYV"), None);
    }

    /// Test that the configuration file is loaded
    #[test]
    fn test_config_from_file() {
        let preview = LivePreviewBuilder::new()
            .session_manager(Arc::new(NullCamera))
            .command_executor(Arc::new(NullCamera))
            .config_from_file("res/live_preview.toml")
            .expect("Cannot load the live preview configuration")
            .build()
            .expect("Failed to build live preview");

        assert_eq!(preview.restart_delay(), Duration::from_millis(2500));
    }

    /// Test that the idle timeout is read from the configuration file
    #[test]
    fn test_config_idle_timeout() {
        let config: PreviewConfig = serde_any::from_file("res/live_preview.toml")
            .expect("Cannot load the live preview configuration");

        assert_eq!(config.idle_timeout_ms, 30_000);
        assert_eq!(config.restart_delay_ms, 2500);
    }

    /// Test that a missing configuration file is reported
    #[test]
    fn test_config_file_missing() {
        let result = LivePreviewBuilder::new().config_from_file("res/does_not_exist.toml");

        assert!(matches!(result, Err(Error::FileNotFound(_))));
    }

    /// Test that an unknown image format in the configuration is rejected
    #[test]
    fn test_config_bad_format() {
        let config = PreviewConfig {
            image_format: Some(String::from("YUYV")),
            ..PreviewConfig::default()
        };

        assert!(matches!(
            LivePreviewBuilder::new().config(config),
            Err(Error::ImageFormatError(_))
        ));
    }

    /// Test that the defaults are used when nothing is configured
    #[test]
    fn test_defaults() {
        assert_eq!(PreviewConfig::default().restart_delay_ms, 5000);
        assert_eq!(PreviewConfig::default().idle_timeout_ms, 60_000);

        let preview = LivePreviewBuilder::new()
            .session_manager(Arc::new(NullCamera))
            .command_executor(Arc::new(NullCamera))
            .build()
            .expect("Failed to build live preview");

        assert_eq!(preview.restart_delay(), DEFAULT_RESTART_DELAY);
    }

    /// Test that required collaborators are checked
    #[test]
    fn test_missing_collaborators() {
        assert!(matches!(
            LivePreviewBuilder::new().command_executor(Arc::new(NullCamera)).build(),
            Err(Error::BuildError(_))
        ));
        assert!(matches!(
            LivePreviewBuilder::new().session_manager(Arc::new(NullCamera)).build(),
            Err(Error::BuildError(_))
        ));
    }
}
