//! Error types for tether

use crate::matching::ApplicationError;
use crate::state::Disconnected;
use thiserror::Error;

/// Result type for tether operations
pub type Result<T> = std::result::Result<T, TetherError>;

/// Tether error types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TetherError {
    /// No matching response arrived before the request deadline
    #[error("Request timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Request refused or aborted while the connection was down
    #[error("Connection unavailable: {state}")]
    Disconnected { state: Disconnected },

    /// Remote side answered the request with an error frame
    #[error("Application error {code}: {message}")]
    Application { code: i32, message: String },

    /// Incoming frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Outgoing payload could not be encoded
    #[error("Encode error: {0}")]
    Encode(String),

    /// Socket-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid endpoint or client setup
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TetherError {
    /// Shorthand for a disconnect rejection
    pub fn disconnected(state: Disconnected) -> Self {
        TetherError::Disconnected { state }
    }

    /// Whether this error was caused by the connection being unavailable
    pub fn is_disconnected(&self) -> bool {
        matches!(self, TetherError::Disconnected { .. })
    }
}

impl From<ApplicationError> for TetherError {
    fn from(err: ApplicationError) -> Self {
        TetherError::Application {
            code: err.code,
            message: err.message,
        }
    }
}

impl From<serde_json::Error> for TetherError {
    fn from(err: serde_json::Error) -> Self {
        TetherError::Decode(err.to_string())
    }
}
