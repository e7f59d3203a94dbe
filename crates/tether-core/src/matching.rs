//! Matcher and push-handler verdicts
//!
//! The transport never looks inside a frame. Callers hand it a matcher that
//! decides whether a frame answers their request, and push handlers that
//! decide whether they consume an unsolicited frame.

use serde::{Deserialize, Serialize};

/// Error returned by the remote side for a specific request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationError {
    pub code: i32,
    pub message: String,
}

impl ApplicationError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Verdict of a request matcher for one incoming frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match<T> {
    /// Frame does not belong to this request
    Skip,
    /// Frame answers this request successfully
    Accept(T),
    /// Frame is an error answer to this request
    Reject(ApplicationError),
}

/// Verdict of a push handler for one unsolicited frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Stop dispatching this frame
    Handled,
    /// Offer the frame to the next handler
    Ignored,
}

impl From<bool> for PushOutcome {
    fn from(handled: bool) -> Self {
        if handled {
            PushOutcome::Handled
        } else {
            PushOutcome::Ignored
        }
    }
}
