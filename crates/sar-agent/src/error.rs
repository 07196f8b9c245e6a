//! Agent bridge error types.

use thiserror::Error;

/// Errors from the agent bridge.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Client channel closed")]
    ChannelClosed,
}

impl AgentError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
