//! # tether-core
//!
//! Core types shared across the tether client transport.
//!
//! This crate provides the foundational types used by every other crate:
//! - Connection state machine variants
//! - Error taxonomy delivered to request callers
//! - Matcher and push-handler verdicts
//! - Reconnection backoff policy

pub mod error;
pub mod matching;
pub mod reconnect;
pub mod state;

pub use error::{Result, TetherError};
pub use matching::{ApplicationError, Match, PushOutcome};
pub use reconnect::ReconnectPolicy;
pub use state::{Connected, ConnectionState, Disconnected};
