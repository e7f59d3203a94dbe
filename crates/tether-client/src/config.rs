//! Client configuration

use std::time::Duration;
use tether_core::{ReconnectPolicy, Result, TetherError};
use tether_transport::Scheme;
use url::Url;

/// Endpoint used when none is configured
pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/socket";

/// Configuration for a tether client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Endpoint URL (`ws://`, `wss://` or `tcp://`)
    pub url: String,
    /// HTTP(S) URL probed after a failed first attempt (default: none)
    pub probe_url: Option<String>,
    /// Default per-request timeout (default: 30s)
    pub request_timeout: Duration,
    /// Limit on a single connection attempt (default: 10s)
    pub connect_timeout: Duration,
    /// Limit on the authorization probe (default: 5s)
    pub probe_timeout: Duration,
    /// Delays between automatic reconnection attempts
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.into(),
            probe_url: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_probe(mut self, probe_url: impl Into<String>) -> Self {
        self.probe_url = Some(probe_url.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Reject unsupported endpoint or probe URLs before anything is spawned
    pub fn validate(&self) -> Result<()> {
        Scheme::of(&self.url)?;

        if let Some(probe_url) = &self.probe_url {
            let parsed = Url::parse(probe_url).map_err(|e| {
                TetherError::Config(format!("Invalid probe URL '{}': {}", probe_url, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(TetherError::Config(format!(
                    "Probe URL must be http or https, got '{}'",
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }
}
