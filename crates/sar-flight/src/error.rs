//! Flight-controller error types.

use thiserror::Error;

/// Errors from the flight-controller adapter.
#[derive(Error, Debug)]
pub enum FlightError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Controller not connected")]
    NotConnected,

    #[error("Command rejected: {0}")]
    CommandRejected(String),

    #[error("Command timed out: {0}")]
    Timeout(String),

    #[error("Telemetry parse error: {0}")]
    Parse(String),

    #[error("Video stream error: {0}")]
    Video(String),
}

impl FlightError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::CommandRejected(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}

pub type FlightResult<T> = Result<T, FlightError>;
