//! Payload/frame codecs
//!
//! The client never interprets frames itself: a codec turns outgoing
//! payloads into bytes and incoming bytes into frames that matchers and push
//! handlers inspect.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tether_core::{Result, TetherError};

/// Application-level codec used by the client
pub trait Codec: Send + Sync + 'static {
    /// Outgoing request payload
    type Payload: Send + 'static;
    /// Decoded incoming frame
    type Frame: Send + 'static;

    /// Serialize a payload into one frame's bytes
    fn encode(&self, payload: &Self::Payload) -> Result<Vec<u8>>;

    /// Deserialize one received frame
    fn decode(&self, bytes: &[u8]) -> Result<Self::Frame>;
}

/// JSON codec carried in binary frames
pub struct JsonCodec<P, F> {
    _marker: PhantomData<fn() -> (P, F)>,
}

impl<P, F> JsonCodec<P, F> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<P, F> Default for JsonCodec<P, F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, F> Clone for JsonCodec<P, F> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<P, F> std::fmt::Debug for JsonCodec<P, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<P, F> Codec for JsonCodec<P, F>
where
    P: Serialize + Send + 'static,
    F: DeserializeOwned + Send + 'static,
{
    type Payload = P;
    type Frame = F;

    fn encode(&self, payload: &P) -> Result<Vec<u8>> {
        serde_json::to_vec(payload).map_err(|e| TetherError::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<F> {
        serde_json::from_slice(bytes).map_err(Into::into)
    }
}
