//! # Session Module
//!
//! Interfaces to the camera session and command layers. The live preview only needs a session
//! id, the ability to switch the camera into image capture mode, and a description of the
//! streaming request to open.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::error::Result;

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

/// Negotiates the session that scopes camera commands.
///
/// Implementations report failures as [`Error::SessionNegotiation`](crate::error::Error).
pub trait SessionManager: Send + Sync {
    /// Get the current session, starting a new one if required.
    fn current_session(&self) -> Result<Session>;
}

/// Executes commands against the camera.
pub trait CommandExecutor: Send + Sync {
    /// Execute a command, failing with [`Error::Command`](crate::error::Error).
    fn execute(&self, command: &Command) -> Result<()>;

    /// Build the request which opens the live preview stream for the given session.
    fn live_preview_request(&self, session: &Session) -> RequestDescriptor;
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTS
// -----------------------------------------------------------------------------------------------

/// An opaque session negotiated with the camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String
}

/// Everything needed to issue an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: Method,

    pub url: String,

    pub headers: Vec<(String, String)>,

    pub body: Option<Vec<u8>>
}

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post
}

/// The camera-side capture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Still image capture, required for live preview
    Image,

    /// Video capture
    Video
}

/// Commands the live preview issues before opening a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Set the `captureMode` option of the session
    SetCaptureMode {
        session_id: String,
        mode: CaptureMode
    }
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Session {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self { id: id.into() }
    }
}

impl RequestDescriptor {
    pub fn new<S: Into<String>>(method: Method, url: S) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None
        }
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));

        self
    }

    pub fn body<B: Into<Vec<u8>>>(mut self, body: B) -> Self {
        self.body = Some(body.into());

        self
    }
}

impl CaptureMode {
    /// The name of the camera option this mode is written to.
    pub fn key(&self) -> &'static str {
        "captureMode"
    }

    /// The value of the camera option.
    pub fn value(&self) -> &'static str {
        match self {
            CaptureMode::Image => "image",
            CaptureMode::Video => "_video"
        }
    }
}

impl Command {
    pub fn set_capture_mode(session: &Session, mode: CaptureMode) -> Self {
        Command::SetCaptureMode {
            session_id: session.id.clone(),
            mode
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
