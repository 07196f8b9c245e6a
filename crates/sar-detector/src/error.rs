//! Detector error types.

use thiserror::Error;

/// Errors from the detector adapter.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Frame encode error: {0}")]
    Encode(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

impl DetectorError {
    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for DetectorError {
    fn from(err: opencv::Error) -> Self {
        DetectorError::Inference(err.to_string())
    }
}

pub type DetectorResult<T> = Result<T, DetectorError>;
