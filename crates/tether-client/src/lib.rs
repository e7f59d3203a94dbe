//! Auto-reconnecting request/response client
//!
//! A `Client` keeps one connection to an endpoint alive, correlates
//! responses to requests through caller-supplied matchers, and hands every
//! unsolicited frame to registered push handlers.
//!
//! ```no_run
//! use serde_json::{Value, json};
//! use tether_client::{Client, ClientConfig};
//! use tether_core::Match;
//! use tether_transport::JsonCodec;
//!
//! # async fn demo() -> tether_core::Result<()> {
//! let client = Client::connect(
//!     ClientConfig::new("ws://127.0.0.1:8080/socket"),
//!     JsonCodec::<Value, Value>::new(),
//! )?;
//!
//! let games = client
//!     .request(json!({"id": 1, "op": "list_games"}), |frame: &Value| {
//!         if frame["id"] == 1 {
//!             Match::Accept(frame["result"].clone())
//!         } else {
//!             Match::Skip
//!         }
//!     })
//!     .await?;
//! # drop(games);
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod connection;
pub mod pending;
pub mod probe;
pub mod registry;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::ClientConfig;
pub use connection::PushHandler;
pub use pending::{PendingTable, RequestId};
pub use probe::{AuthProbe, HttpProbe, ProbeVerdict};
pub use registry::HandlerId;
pub use state::{StateListener, StateManager};

use connection::{Command, Connection};
use futures_util::FutureExt;
use parking_lot::Mutex;
use registry::Registry;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tether_core::{ConnectionState, Disconnected, Match, PushOutcome, Result, TetherError};
use tether_transport::{Codec, Connector, DefaultConnector};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Handle to a connection event loop.
///
/// Dropping the last handle shuts the loop down the same way `close` does.
pub struct Client<K: Codec> {
    state: Arc<StateManager>,
    handlers: Arc<Registry<PushHandler<K::Frame>>>,
    commands: mpsc::UnboundedSender<Command<K::Payload, K::Frame>>,
    task: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl<K: Codec> Client<K> {
    /// Validate `config` and start connecting.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: ClientConfig, codec: K) -> Result<Self> {
        config.validate()?;

        let probe = match &config.probe_url {
            Some(url) => {
                let probe: Arc<dyn AuthProbe> = Arc::new(HttpProbe::new(url, config.probe_timeout)?);
                Some(probe)
            }
            None => None,
        };
        Ok(Self::with_parts(
            config,
            codec,
            Arc::new(DefaultConnector::new()),
            probe,
        ))
    }

    /// Start connecting with an explicit connector and probe
    pub fn with_parts(
        config: ClientConfig,
        codec: K,
        connector: Arc<dyn Connector>,
        probe: Option<Arc<dyn AuthProbe>>,
    ) -> Self {
        let state = Arc::new(StateManager::new(ConnectionState::CONNECTING));
        let handlers = Arc::new(Registry::new());
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let request_timeout = config.request_timeout;

        let connection = Connection::new(
            config,
            codec,
            connector,
            probe,
            state.clone(),
            handlers.clone(),
            commands_rx,
        );
        let loop_state = state.clone();
        let loop_handlers = handlers.clone();
        let task = tokio::spawn(async move {
            // A panic anywhere in the loop closes the client for good
            if AssertUnwindSafe(connection.run()).catch_unwind().await.is_err() {
                error!("Connection task panicked, client is closed");
                loop_state.dispose();
                loop_handlers.clear();
            }
        });

        Self {
            state,
            handlers,
            commands,
            task: Mutex::new(Some(task)),
            request_timeout,
        }
    }

    /// Send `payload` and wait for the first frame `matcher` claims, using
    /// the configured request timeout
    pub async fn request<T, M>(&self, payload: K::Payload, matcher: M) -> Result<T>
    where
        M: FnMut(&K::Frame) -> Match<T> + Send + 'static,
        T: Send + 'static,
    {
        self.request_with_timeout(payload, matcher, self.request_timeout)
            .await
    }

    /// Send `payload` and wait for the first frame `matcher` claims.
    ///
    /// Fails immediately with `Disconnected` while the connection is down.
    pub async fn request_with_timeout<T, M>(
        &self,
        payload: K::Payload,
        matcher: M,
        timeout: Duration,
    ) -> Result<T>
    where
        M: FnMut(&K::Frame) -> Match<T> + Send + 'static,
        T: Send + 'static,
    {
        if let Some(state) = self.state.get().disconnected() {
            return Err(TetherError::disconnected(state));
        }

        let (reply, outcome) = oneshot::channel();
        let waiter = pending::waiter(matcher, move |result| {
            let _ = reply.send(result);
        });
        self.commands
            .send(Command::Send {
                payload,
                waiter,
                timeout,
            })
            .map_err(|_| TetherError::disconnected(Disconnected::Closed))?;

        outcome
            .await
            .unwrap_or(Err(TetherError::disconnected(Disconnected::Closed)))
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Call `listener` on every state transition from now on
    pub fn subscribe<L>(&self, listener: L) -> HandlerId
    where
        L: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.state.register_listener(listener)
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.state.unregister_listener(id)
    }

    /// Offer unclaimed frames to `handler`, after every earlier handler
    pub fn on_push<H>(&self, handler: H) -> HandlerId
    where
        H: Fn(&K::Frame) -> PushOutcome + Send + Sync + 'static,
    {
        self.handlers.register(Arc::new(handler))
    }

    pub fn off_push(&self, id: HandlerId) -> bool {
        self.handlers.unregister(id)
    }

    /// Reconnect now with a fresh attempt counter.
    ///
    /// Also the only way out of `Unauthorized`. Ignored while a connection
    /// is live.
    pub fn reconnect(&self) {
        if self.commands.send(Command::Reconnect).is_err() {
            debug!("Reconnect requested after close");
        }
    }

    /// Abort pending requests, stop reconnecting and close the connection.
    ///
    /// No listener or push handler runs afterwards. Safe to call twice. A
    /// connect attempt or authorization probe in progress finishes first, so
    /// this may wait up to `connect_timeout` (or `probe_timeout`).
    pub async fn close(&self) {
        let _ = self.commands.send(Command::Shutdown);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!("Connection task ended abnormally: {}", e);
            }
        }
    }
}
