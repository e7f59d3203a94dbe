//! In-memory connector and peer for driving the event loop from tests

use crate::probe::{AuthProbe, ProbeVerdict};
use crate::{Client, ClientConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tether_core::{ApplicationError, ConnectionState, Match, Result, TetherError};
use tether_transport::{Codec, Connector, Inbound, JsonCodec, Transport};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, timeout};

pub(crate) type TestClient = Client<JsonCodec<Value, Value>>;

/// Far enough out that auto-advanced test time never trips it
const PATIENCE: Duration = Duration::from_secs(3_600);

pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::new("ws://lobby.test/socket").with_connect_timeout(Duration::from_secs(86_400))
}

pub(crate) fn spawn_client(
    config: ClientConfig,
    probe: Option<Arc<dyn AuthProbe>>,
) -> (Arc<TestClient>, MockServer) {
    spawn_client_with(config, JsonCodec::new(), probe)
}

pub(crate) fn spawn_client_with<K: Codec>(
    config: ClientConfig,
    codec: K,
    probe: Option<Arc<dyn AuthProbe>>,
) -> (Arc<Client<K>>, MockServer) {
    let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
    let connector = MockConnector {
        attempts: attempts_tx,
    };
    let client = Client::with_parts(config, codec, Arc::new(connector), probe);
    let server = MockServer {
        attempts: attempts_rx,
    };
    (Arc::new(client), server)
}

/// Issue `{"id": id, "op": "get"}` on a separate task
pub(crate) fn spawn_request(
    client: &Arc<TestClient>,
    id: u64,
    limit: Option<Duration>,
) -> tokio::task::JoinHandle<Result<Value>> {
    let client = client.clone();
    tokio::spawn(async move {
        let payload = serde_json::json!({ "id": id, "op": "get" });
        match limit {
            Some(limit) => client.request_with_timeout(payload, by_id(id), limit).await,
            None => client.request(payload, by_id(id)).await,
        }
    })
}

/// Matcher for `{"id": n, "result": ..}` and `{"id": n, "error": {code, message}}`
pub(crate) fn by_id(id: u64) -> impl FnMut(&Value) -> Match<Value> + Send + 'static {
    move |frame| {
        if frame.get("id").and_then(Value::as_u64) != Some(id) {
            return Match::Skip;
        }
        match frame.get("error") {
            Some(error) => Match::Reject(ApplicationError::new(
                error["code"].as_i64().unwrap_or(0) as i32,
                error["message"].as_str().unwrap_or_default(),
            )),
            None => Match::Accept(frame.get("result").cloned().unwrap_or(Value::Null)),
        }
    }
}

struct MockConnector {
    attempts: mpsc::UnboundedSender<Attempt>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>> {
        let (reply, outcome) = oneshot::channel();
        self.attempts
            .send(Attempt {
                url: url.to_string(),
                reply,
            })
            .map_err(|_| TetherError::Transport("mock server gone".into()))?;
        outcome
            .await
            .map_err(|_| TetherError::Transport("attempt abandoned".into()))?
    }
}

/// Receives every connection attempt the client makes
pub(crate) struct MockServer {
    attempts: mpsc::UnboundedReceiver<Attempt>,
}

impl MockServer {
    pub(crate) async fn next_attempt(&mut self) -> Attempt {
        timeout(PATIENCE, self.attempts.recv())
            .await
            .expect("no connection attempt")
            .expect("connector dropped")
    }

    pub(crate) fn try_attempt(&mut self) -> Option<Attempt> {
        self.attempts.try_recv().ok()
    }
}

/// One pending connect call
pub(crate) struct Attempt {
    pub(crate) url: String,
    reply: oneshot::Sender<Result<Box<dyn Transport>>>,
}

impl Attempt {
    pub(crate) fn accept(self) -> Peer {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let transport = MockTransport {
            inbound: inbound_rx,
            outbound: outbound_tx,
        };
        let _ = self.reply.send(Ok(Box::new(transport)));
        Peer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        }
    }

    pub(crate) fn fail(self, reason: &str) {
        let _ = self
            .reply
            .send(Err(TetherError::Transport(reason.to_string())));
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Result<Inbound>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: Vec<u8>) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| TetherError::Transport("peer gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<Inbound>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Server end of an accepted mock connection; dropping it closes the connection
pub(crate) struct Peer {
    inbound: mpsc::UnboundedSender<Result<Inbound>>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Peer {
    pub(crate) fn push(&self, frame: Value) {
        let bytes = serde_json::to_vec(&frame).unwrap();
        self.send_raw(bytes);
    }

    pub(crate) fn send_raw(&self, bytes: Vec<u8>) {
        let _ = self.inbound.send(Ok(Inbound::Binary(bytes)));
    }

    pub(crate) fn send_text(&self, text: &str) {
        let _ = self.inbound.send(Ok(Inbound::Text(text.to_string())));
    }

    /// Report a read error; the client treats it as error followed by close
    pub(crate) fn fail(&self, reason: &str) {
        let _ = self
            .inbound
            .send(Err(TetherError::Transport(reason.to_string())));
    }

    pub(crate) async fn next_sent(&mut self) -> Value {
        let bytes = timeout(PATIENCE, self.outbound.recv())
            .await
            .expect("client sent nothing")
            .expect("client dropped the transport");
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Make every further client write fail
    pub(crate) fn refuse_writes(&mut self) {
        self.outbound.close();
    }

    /// Wait until the client drops its end of the connection
    pub(crate) async fn closed(&mut self) {
        while timeout(PATIENCE, self.outbound.recv())
            .await
            .expect("transport still open")
            .is_some()
        {}
    }
}

/// Records every state transition with the (test) time it happened
pub(crate) struct StateLog {
    seen: mpsc::UnboundedReceiver<(ConnectionState, Instant)>,
}

impl StateLog {
    pub(crate) fn attach<K: Codec>(client: &Client<K>) -> Self {
        let (tx, seen) = mpsc::unbounded_channel();
        client.subscribe(move |state| {
            let _ = tx.send((state, Instant::now()));
        });
        Self { seen }
    }

    pub(crate) async fn next(&mut self) -> ConnectionState {
        self.next_at().await.0
    }

    pub(crate) async fn next_at(&mut self) -> (ConnectionState, Instant) {
        timeout(PATIENCE, self.seen.recv())
            .await
            .expect("no state transition")
            .expect("state log detached")
    }

    /// Skip transitions until `target` is seen
    pub(crate) async fn wait_for(&mut self, target: ConnectionState) -> Instant {
        loop {
            let (state, at) = self.next_at().await;
            if state == target {
                return at;
            }
        }
    }

    pub(crate) fn try_next(&mut self) -> Option<ConnectionState> {
        self.seen.try_recv().ok().map(|(state, _)| state)
    }
}

/// Probe with a fixed verdict that counts how often it ran
pub(crate) struct FakeProbe {
    /// `None` never answers
    verdict: Option<ProbeVerdict>,
    checks: AtomicUsize,
}

impl FakeProbe {
    pub(crate) fn new(verdict: ProbeVerdict) -> Arc<Self> {
        Arc::new(Self {
            verdict: Some(verdict),
            checks: AtomicUsize::new(0),
        })
    }

    pub(crate) fn hanging() -> Arc<Self> {
        Arc::new(Self {
            verdict: None,
            checks: AtomicUsize::new(0),
        })
    }

    pub(crate) fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthProbe for FakeProbe {
    async fn check(&self) -> ProbeVerdict {
        self.checks.fetch_add(1, Ordering::SeqCst);
        match self.verdict {
            Some(verdict) => verdict,
            None => std::future::pending().await,
        }
    }
}
