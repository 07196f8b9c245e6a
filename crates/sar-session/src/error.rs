//! Session error taxonomy.
//!
//! Nothing here is fatal to the process. Only `TransportClosed` ends a
//! session, and it still runs the guaranteed controller teardown.

use thiserror::Error;

/// Errors arising inside one socket session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A command arrived for an adapter that is not initialized yet.
    /// Ignored, never fatal.
    #[error("Adapter unavailable: {0}")]
    AdapterUnavailable(String),

    /// An external adapter call exceeded its bound. Logged, tick continues.
    #[error("Adapter timed out: {0}")]
    AdapterTimeout(String),

    /// A store write or read failed. Logged, never surfaced to the client.
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    /// The client disconnected; triggers teardown of any owned controller.
    #[error("Transport closed")]
    TransportClosed,

    /// Unrecognized event name or malformed payload. Answered with an error
    /// message; the connection stays open.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::AdapterUnavailable(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::AdapterTimeout(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
