//! WebSocket transport
//!
//! Frames travel as binary WebSocket messages. Control frames are handled by
//! tungstenite and never surface to the client.

use crate::transport::{Connector, Inbound, Transport};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tether_core::{Result, TetherError};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket transports
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TetherError::Transport(format!("WebSocket connect to {} failed: {}", url, e)))?;
        debug!("WebSocket handshake with {} ({})", url, response.status());
        Ok(Box::new(WsTransport { stream }))
    }
}

/// An open WebSocket connection
pub struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        self.stream
            .send(Message::Binary(frame.into()))
            .await
            .map_err(|e| TetherError::Transport(format!("WebSocket send failed: {}", e)))
    }

    async fn recv(&mut self) -> Option<Result<Inbound>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Binary(data)) => return Some(Ok(Inbound::Binary(data.to_vec()))),
                Ok(Message::Text(text)) => return Some(Ok(Inbound::Text(text.to_string()))),
                Ok(Message::Close(frame)) => {
                    match frame {
                        Some(f) => info!("Server closed connection: {} {}", f.code, f.reason),
                        None => info!("Server closed connection"),
                    }
                    return None;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => {
                    return Some(Err(TetherError::Transport(format!(
                        "WebSocket read failed: {}",
                        e
                    ))));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .map_err(|e| TetherError::Transport(format!("WebSocket close failed: {}", e)))
    }
}
