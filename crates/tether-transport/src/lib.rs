//! Transports and codecs for the tether client
//!
//! This crate provides:
//! - Transport abstractions (`Transport`/`Connector` traits)
//! - WebSocket and length-prefixed TCP transports
//! - Scheme-dispatching default connector
//! - Codec trait with a JSON implementation

pub mod codec;
pub mod tcp;
pub mod transport;
pub mod ws;

pub use codec::{Codec, JsonCodec};
pub use tcp::{TcpConnector, TcpTransport};
pub use transport::{Connector, DefaultConnector, Inbound, Scheme, Transport};
pub use ws::{WsConnector, WsTransport};
