//! tether command-line client
//!
//! Connects to an endpoint and keeps the connection alive. Each stdin line
//! is sent as a JSON request tagged with a fresh `id`; the matching response
//! (`{"id": n, "result": ..}` or `{"id": n, "error": {"code", "message"}}`)
//! is printed to stdout. Pushed frames are printed as they arrive. Logs go
//! to stderr.

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::Value;
use std::time::Duration;
use tether_client::{Client, ClientConfig, config::DEFAULT_URL};
use tether_core::{ApplicationError, Match, PushOutcome, ReconnectPolicy};
use tether_transport::JsonCodec;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "tether", author, version, about, long_about = None)]
struct Args {
    /// Endpoint URL (ws://, wss:// or tcp://)
    #[arg(long, env = "TETHER_URL", default_value = DEFAULT_URL)]
    url: String,

    /// HTTP(S) URL probed to detect refused credentials
    #[arg(long, env = "TETHER_PROBE_URL")]
    probe_url: Option<String>,

    /// Per-request timeout in milliseconds
    #[arg(long, default_value_t = 30_000)]
    timeout_ms: u64,

    /// Do not reconnect automatically after the connection drops
    #[arg(long)]
    no_reconnect: bool,
}

impl Args {
    fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.url)
            .with_request_timeout(Duration::from_millis(self.timeout_ms));
        if let Some(probe_url) = &self.probe_url {
            config = config.with_probe(probe_url);
        }
        if self.no_reconnect {
            config = config.with_reconnect(ReconnectPolicy::never());
        }
        config
    }
}

/// Claims `{"id": id, ..}` frames
fn response_to(id: u64) -> impl FnMut(&Value) -> Match<Value> + Send + 'static {
    move |frame| {
        if frame.get("id").and_then(Value::as_u64) != Some(id) {
            return Match::Skip;
        }
        match frame.get("error") {
            Some(error) => Match::Reject(ApplicationError::new(
                error.get("code").and_then(Value::as_i64).unwrap_or(-1) as i32,
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error"),
            )),
            None => Match::Accept(frame.get("result").cloned().unwrap_or(Value::Null)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let client = Client::connect(args.config(), JsonCodec::<Value, Value>::new())
        .context("Invalid client configuration")?;

    client.subscribe(|state| info!("Connection state: {}", state));
    client.on_push(|frame: &Value| {
        println!("{}", frame);
        PushOutcome::Handled
    });

    info!("tether client started for {}", args.url);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut next_id: u64 = 1;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let id = next_id;
        next_id += 1;
        let payload = match tag_request(&line, id) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Skipping input line: {:#}", e);
                continue;
            }
        };

        match client.request(payload, response_to(id)).await {
            Ok(result) => println!("{}", result),
            Err(e) => warn!("Request {} failed: {}", id, e),
        }
    }

    client.close().await;
    Ok(())
}

/// Parse a JSON object from `line` and set its `id`
fn tag_request(line: &str, id: u64) -> Result<Value> {
    let mut payload: Value = serde_json::from_str(line).context("Input is not valid JSON")?;
    let Some(object) = payload.as_object_mut() else {
        bail!("Input must be a JSON object");
    };
    object.insert("id".into(), Value::from(id));
    Ok(payload)
}
