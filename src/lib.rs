//! # Live preview client for OSC cameras
//!
//! This crate keeps a continuous live preview flowing from a camera which serves its preview as
//! a `multipart/x-mixed-replace` stream of still images. Each complete image is decoded and
//! passed to a callback. When the connection drops the callback is passed `None` and the
//! preview is restarted after a fixed delay, until it is stopped.
//!
//! Session negotiation and camera commands are provided by the application through the
//! [`SessionManager`] and [`CommandExecutor`] traits. The stream itself is opened by a
//! [`Transport`], by default [`HttpTransport`].
//!
//! ## Installation
//!
//! ```toml
//! [dependencies]
//! osc_live_preview = "0.1"
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let preview = LivePreviewBuilder::new()
//!     // Provides the session id which scopes camera commands
//!     .session_manager(camera.clone())
//!     // Sets the capture mode and describes the live preview request
//!     .command_executor(camera.clone())
//!     // Optional, the default is 5 seconds
//!     .restart_delay(Duration::from_secs(5))
//!     .build()
//!     .expect("Failed to build live preview");
//!
//! preview.start(|frame| match frame {
//!     Some(frame) => display(frame.image()),
//!     None => show_reconnecting()
//! })?;
//!
//! // ...
//!
//! preview.stop();
//! ```

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use builder::{LivePreviewBuilder, PreviewConfig};
pub use error::{Error, Result};
pub use extractor::FrameExtractor;
pub use frame::{Frame, FrameDecoder, ImageFrameDecoder};
pub use http::{HttpTransport, DEFAULT_IDLE_TIMEOUT};
pub use livepreview::{FrameCallback, Generation, LivePreview, StreamState};
pub use multipart::{MultipartSplitter, Part};
pub use scheduler::{schedule_after, RestartScheduler, TaskHandle, DEFAULT_RESTART_DELAY};
pub use session::{
    CaptureMode, Command, CommandExecutor, Method, RequestDescriptor, Session, SessionManager
};
pub use transport::{ConnectionHandle, EventSink, Transport, TransportEvent};

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

mod builder;
mod delivery;
mod error;
mod extractor;
mod frame;
mod http;
mod livepreview;
mod multipart;
mod scheduler;
mod session;
mod transport;

pub mod prelude {
    pub use crate::{LivePreviewBuilder, LivePreview, StreamState, Frame};
    pub use crate::{CommandExecutor, SessionManager, Session, RequestDescriptor, Method};
}
