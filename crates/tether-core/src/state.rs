//! Connection state machine variants
//!
//! The state is a two-family sum type: while disconnected no request may be
//! sent, while connected the sub-variant tracks whether requests are in flight.

use serde::{Deserialize, Serialize};
use std::fmt;

/// States in which no request can be sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disconnected {
    /// A transport is being opened
    Connecting,
    /// The transport closed cleanly, or reconnection gave up
    Closed,
    /// The transport reported an error
    TransportError,
    /// The endpoint rejected our credentials; only a fresh open leaves this state
    Unauthorized,
}

/// States in which the transport is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Connected {
    /// Handshake just completed
    Open,
    /// Idle, no request in flight
    Ready,
    /// At least one request in flight
    Fetching,
}

/// Current connection/session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", content = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected(Disconnected),
    Connected(Connected),
}

impl ConnectionState {
    pub const CONNECTING: Self = Self::Disconnected(Disconnected::Connecting);
    pub const CLOSED: Self = Self::Disconnected(Disconnected::Closed);
    pub const TRANSPORT_ERROR: Self = Self::Disconnected(Disconnected::TransportError);
    pub const UNAUTHORIZED: Self = Self::Disconnected(Disconnected::Unauthorized);
    pub const OPEN: Self = Self::Connected(Connected::Open);
    pub const READY: Self = Self::Connected(Connected::Ready);
    pub const FETCHING: Self = Self::Connected(Connected::Fetching);

    /// Whether the transport is open
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    /// Whether requests must be refused
    pub fn is_disconnected(&self) -> bool {
        matches!(self, ConnectionState::Disconnected(_))
    }

    /// The disconnect reason, if any
    pub fn disconnected(&self) -> Option<Disconnected> {
        match self {
            ConnectionState::Disconnected(reason) => Some(*reason),
            ConnectionState::Connected(_) => None,
        }
    }
}

impl From<Disconnected> for ConnectionState {
    fn from(state: Disconnected) -> Self {
        ConnectionState::Disconnected(state)
    }
}

impl From<Connected> for ConnectionState {
    fn from(state: Connected) -> Self {
        ConnectionState::Connected(state)
    }
}

impl fmt::Display for Disconnected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Disconnected::Connecting => "connecting",
            Disconnected::Closed => "closed",
            Disconnected::TransportError => "transport_error",
            Disconnected::Unauthorized => "unauthorized",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Connected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Connected::Open => "open",
            Connected::Ready => "ready",
            Connected::Fetching => "fetching",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected(state) => state.fmt(f),
            ConnectionState::Connected(state) => state.fmt(f),
        }
    }
}
