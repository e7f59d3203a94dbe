//! Authorization probe
//!
//! A WebSocket handshake failure does not say why it failed. When the first
//! connection attempt errors, the client asks a probe whether the endpoint
//! is refusing the caller's credentials.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tether_core::{Result, TetherError};
use tracing::debug;

/// What the probe concluded about a failed connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// The endpoint refused the caller's credentials
    Unauthorized,
    /// The failure was something else, or the probe itself failed
    Inconclusive,
}

/// Check run after the first connection error of a cycle
#[async_trait]
pub trait AuthProbe: Send + Sync {
    async fn check(&self) -> ProbeVerdict;
}

/// Probe that issues an HTTP GET and inspects the status code.
///
/// Redirects are not followed: a login redirect counts as a refusal.
pub struct HttpProbe {
    url: String,
    http: reqwest::Client,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| TetherError::Config(format!("Failed to build probe client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

/// Redirects, 401 and 403 mean the caller is not authorized
pub fn classify(status: StatusCode) -> ProbeVerdict {
    if status.is_redirection()
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
    {
        ProbeVerdict::Unauthorized
    } else {
        ProbeVerdict::Inconclusive
    }
}

#[async_trait]
impl AuthProbe for HttpProbe {
    async fn check(&self) -> ProbeVerdict {
        match self.http.get(&self.url).send().await {
            Ok(response) => {
                let verdict = classify(response.status());
                debug!("Probe {} answered {} ({:?})", self.url, response.status(), verdict);
                verdict
            }
            Err(e) => {
                debug!("Probe {} failed: {}", self.url, e);
                ProbeVerdict::Inconclusive
            }
        }
    }
}
