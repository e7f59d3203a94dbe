//! TCP transport with length-prefixed frames
//!
//! Used for `tcp://host:port` endpoints. Each frame is a 4-byte
//! little-endian length followed by the body.

use crate::transport::{Connector, Inbound, Transport};
use async_trait::async_trait;
use std::io::ErrorKind;
use tether_core::{Result, TetherError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

/// Largest frame accepted from the peer (64 MiB)
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Opens length-prefixed TCP transports
#[derive(Debug, Default, Clone)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let addr = socket_addr(url)?;
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| TetherError::Transport(format!("Failed to connect to {}: {}", addr, e)))?;
        let _ = stream.set_nodelay(true);
        debug!("TCP transport connected to {}", addr);
        Ok(Box::new(TcpTransport::new(stream)))
    }
}

/// Extract `host:port` from a `tcp://` URL
fn socket_addr(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| TetherError::Config(format!("Invalid TCP URL '{}': {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| TetherError::Config("Missing host in TCP URL".into()))?;
    let port = parsed
        .port()
        .ok_or_else(|| TetherError::Config("Missing port in TCP URL".into()))?;
    Ok(format!("{}:{}", host, port))
}

/// Length-prefixed frame transport over a TCP stream
///
/// Reads happen on a background task so `recv` stays cancel safe.
pub struct TcpTransport {
    writer: OwnedWriteHalf,
    frames: mpsc::Receiver<Result<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, writer) = stream.into_split();
        let (frame_tx, frames) = mpsc::channel(64);
        let reader = tokio::spawn(reader_task(read_half, frame_tx));
        Self {
            writer,
            frames,
            reader,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        write_frame(&mut self.writer, &frame).await
    }

    async fn recv(&mut self) -> Option<Result<Inbound>> {
        self.frames
            .recv()
            .await
            .map(|frame| frame.map(Inbound::Binary))
    }

    async fn close(&mut self) -> Result<()> {
        self.reader.abort();
        self.writer
            .shutdown()
            .await
            .map_err(|e| TetherError::Transport(format!("TCP shutdown failed: {}", e)))
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Background task pumping frames from the socket into the channel.
///
/// A clean EOF between frames ends the stream without an error.
async fn reader_task(mut reader: OwnedReadHalf, frames: mpsc::Sender<Result<Vec<u8>>>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(frame)) => {
                if frames.send(Ok(frame)).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!("TCP peer closed connection");
                break;
            }
            Err(e) => {
                let _ = frames.send(Err(e)).await;
                break;
            }
        }
    }
}

/// Read one frame; `Ok(None)` on EOF at a frame boundary
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    // Read 4-byte length prefix (little-endian)
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => {
            return Err(TetherError::Transport(format!(
                "TCP read length failed: {}",
                e
            )));
        }
    }
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(TetherError::Transport(format!(
            "Frame too large: {} bytes",
            len
        )));
    }

    let mut data = vec![0u8; len];
    reader
        .read_exact(&mut data)
        .await
        .map_err(|e| TetherError::Transport(format!("TCP read data failed: {}", e)))?;

    Ok(Some(data))
}

/// Write one length-prefixed frame and flush
pub async fn write_frame<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if data.len() > MAX_FRAME_LEN {
        return Err(TetherError::Transport(format!(
            "Frame too large: {} bytes",
            data.len()
        )));
    }

    let len = (data.len() as u32).to_le_bytes();
    writer
        .write_all(&len)
        .await
        .map_err(|e| TetherError::Transport(format!("TCP write length failed: {}", e)))?;
    writer
        .write_all(data)
        .await
        .map_err(|e| TetherError::Transport(format!("TCP write data failed: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| TetherError::Transport(format!("TCP flush failed: {}", e)))?;

    Ok(())
}
