//! Error types shared across the server.

use thiserror::Error;

/// Core error type for the search-and-rescue drone server.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Unknown hazard kind: {0}")]
    UnknownHazardKind(String),

    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("Invalid position: lat={lat}, lng={lng}")]
    InvalidPosition { lat: f64, lng: f64 },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn invalid_position(lat: f64, lng: f64) -> Self {
        Self::InvalidPosition { lat, lng }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
