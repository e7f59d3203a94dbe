//! Transport abstractions for the tether client
//!
//! A `Connector` opens a `Transport` to an endpoint URL. The client owns one
//! transport at a time and replaces it wholesale on reconnect.

use crate::tcp::TcpConnector;
use crate::ws::WsConnector;
use async_trait::async_trait;
use tether_core::{Result, TetherError};
use url::Url;

/// One whole message received from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Binary frame, handed to the codec
    Binary(Vec<u8>),
    /// Text frame; the client only accepts binary payloads
    Text(String),
}

/// An open bidirectional message connection
#[async_trait]
pub trait Transport: Send {
    /// Write a complete frame
    async fn send(&mut self, frame: Vec<u8>) -> Result<()>;

    /// Wait for the next inbound frame.
    ///
    /// Returns `None` once the peer closed the connection. Must be cancel
    /// safe: the client polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<Inbound>>;

    /// Close the connection gracefully
    async fn close(&mut self) -> Result<()>;
}

/// Opens transports to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>>;
}

/// Connector that picks the transport from the URL scheme
///
/// - `ws://`, `wss://`: WebSocket binary messages
/// - `tcp://host:port`: length-prefixed frames
#[derive(Debug, Default, Clone)]
pub struct DefaultConnector {
    ws: WsConnector,
    tcp: TcpConnector,
}

impl DefaultConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Connector for DefaultConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        match Scheme::of(url)? {
            Scheme::WebSocket => self.ws.connect(url).await,
            Scheme::Tcp => self.tcp.connect(url).await,
        }
    }
}

/// Supported endpoint schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    WebSocket,
    Tcp,
}

impl Scheme {
    /// Classify an endpoint URL, rejecting unsupported schemes
    pub fn of(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| TetherError::Config(format!("Invalid endpoint URL '{}': {}", url, e)))?;
        match parsed.scheme() {
            "ws" | "wss" => Ok(Scheme::WebSocket),
            "tcp" => Ok(Scheme::Tcp),
            other => Err(TetherError::Config(format!(
                "Unsupported endpoint scheme '{}'",
                other
            ))),
        }
    }
}
