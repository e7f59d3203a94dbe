//! Connection event loop
//!
//! One task per client owns the transport, the pending request table and
//! the reconnect timer. It waits on:
//! - commands from the `Client` handle (send, reconnect, shutdown)
//! - the next inbound event of the current transport
//! - the earliest request deadline
//! - the reconnect timer
//!
//! and is the only writer of the shared connection state.
//!
//! A connect attempt and the authorization probe are awaited inline, so
//! commands and request deadlines queue behind them for at most
//! `connect_timeout` and `probe_timeout` respectively.

use crate::config::ClientConfig;
use crate::pending::{PendingTable, Waiter};
use crate::probe::{AuthProbe, ProbeVerdict};
use crate::registry::Registry;
use crate::state::StateManager;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tether_core::{ConnectionState, Disconnected, PushOutcome, Result, TetherError};
use tether_transport::{Codec, Connector, Inbound, Transport};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, error, info, warn};

/// Callback offered every frame no pending request claimed
pub type PushHandler<F> = dyn Fn(&F) -> PushOutcome + Send + Sync;

/// Requests from the client handle to the event loop
pub(crate) enum Command<P, F> {
    Send {
        payload: P,
        waiter: Box<dyn Waiter<F>>,
        timeout: Duration,
    },
    Reconnect,
    Shutdown,
}

enum Event<P, F> {
    Command(Option<Command<P, F>>),
    Inbound(Option<Result<Inbound>>),
    Deadline,
    Reconnect,
}

pub(crate) struct Connection<K: Codec> {
    config: ClientConfig,
    codec: K,
    connector: Arc<dyn Connector>,
    probe: Option<Arc<dyn AuthProbe>>,
    state: Arc<StateManager>,
    handlers: Arc<Registry<PushHandler<K::Frame>>>,
    pending: PendingTable<K::Frame>,
    /// Current transport; replaced wholesale on reconnect
    transport: Option<Box<dyn Transport>>,
    /// Reconnection attempts since the last successful open
    attempt: u32,
    reconnect_at: Option<Instant>,
    commands: mpsc::UnboundedReceiver<Command<K::Payload, K::Frame>>,
}

impl<K: Codec> Connection<K> {
    pub(crate) fn new(
        config: ClientConfig,
        codec: K,
        connector: Arc<dyn Connector>,
        probe: Option<Arc<dyn AuthProbe>>,
        state: Arc<StateManager>,
        handlers: Arc<Registry<PushHandler<K::Frame>>>,
        commands: mpsc::UnboundedReceiver<Command<K::Payload, K::Frame>>,
    ) -> Self {
        Self {
            config,
            codec,
            connector,
            probe,
            state,
            handlers,
            pending: PendingTable::new(),
            transport: None,
            attempt: 0,
            reconnect_at: None,
            commands,
        }
    }

    /// Drive the connection until shutdown or until every client handle is gone
    pub(crate) async fn run(mut self) {
        self.connect().await;

        loop {
            let event = tokio::select! {
                biased;
                command = self.commands.recv() => Event::Command(command),
                inbound = next_inbound(&mut self.transport) => Event::Inbound(inbound),
                _ = sleep_until_opt(self.pending.next_deadline()) => Event::Deadline,
                _ = sleep_until_opt(self.reconnect_at) => Event::Reconnect,
            };

            match event {
                Event::Command(None) | Event::Command(Some(Command::Shutdown)) => break,
                Event::Command(Some(Command::Send {
                    payload,
                    waiter,
                    timeout,
                })) => self.send(payload, waiter, timeout).await,
                Event::Command(Some(Command::Reconnect)) => self.manual_reconnect().await,
                Event::Inbound(inbound) => self.on_inbound(inbound).await,
                Event::Deadline => {
                    let expired = self.pending.expire(Instant::now());
                    debug!("{} request(s) timed out", expired);
                    self.settle();
                }
                Event::Reconnect => {
                    self.reconnect_at = None;
                    self.transition(ConnectionState::CONNECTING);
                    self.connect().await;
                }
            }
        }

        self.shutdown().await;
    }

    async fn connect(&mut self) {
        debug!("Connecting to {}", self.config.url);
        let limit = self.config.connect_timeout;
        let result = match timeout(limit, self.connector.connect(&self.config.url)).await {
            Ok(result) => result,
            Err(_) => Err(TetherError::Transport(format!(
                "Connect timed out after {:?}",
                limit
            ))),
        };

        match result {
            Ok(transport) => self.on_open(transport),
            Err(e) => {
                self.on_error(&e).await;
                self.on_close();
            }
        }
    }

    fn on_open(&mut self, transport: Box<dyn Transport>) {
        info!("Connected to {}", self.config.url);
        self.transport = Some(transport);
        self.attempt = 0;
        self.reconnect_at = None;
        self.transition(ConnectionState::OPEN);
    }

    async fn on_error(&mut self, error: &TetherError) {
        warn!("Connection error: {}", error);

        if self.attempt == 0 {
            if let Some(probe) = self.probe.clone() {
                let verdict = timeout(self.config.probe_timeout, probe.check())
                    .await
                    .unwrap_or_else(|_| {
                        debug!("Probe timed out after {:?}", self.config.probe_timeout);
                        ProbeVerdict::Inconclusive
                    });
                if verdict == ProbeVerdict::Unauthorized {
                    warn!("Endpoint {} refused our credentials", self.config.url);
                    self.transition(ConnectionState::UNAUTHORIZED);
                }
            }
        }
        self.transition(ConnectionState::TRANSPORT_ERROR);
    }

    fn on_close(&mut self) {
        self.transport = None;
        if self.state.get() != ConnectionState::TRANSPORT_ERROR {
            self.transition(ConnectionState::CLOSED);
        }
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if self.state.get() == ConnectionState::UNAUTHORIZED {
            info!("Not reconnecting while unauthorized");
            return;
        }

        match self.config.reconnect.delay(self.attempt) {
            Some(delay) => {
                self.attempt += 1;
                info!("Reconnecting in {:?} (attempt {})", delay, self.attempt);
                self.reconnect_at = Instant::now().checked_add(delay);
            }
            None => {
                warn!("Giving up after {} reconnection attempt(s)", self.attempt);
                if self.state.get() != ConnectionState::CLOSED {
                    self.transition(ConnectionState::CLOSED);
                }
            }
        }
    }

    async fn manual_reconnect(&mut self) {
        self.attempt = 0;
        self.reconnect_at = None;

        if self.transport.is_some() {
            debug!("Reconnect requested while connected, ignoring");
            return;
        }
        self.transition(ConnectionState::CONNECTING);
        self.connect().await;
    }

    async fn on_inbound(&mut self, inbound: Option<Result<Inbound>>) {
        match inbound {
            Some(Ok(Inbound::Binary(bytes))) => self.on_frame(&bytes),
            Some(Ok(Inbound::Text(text))) => {
                warn!("Dropping text frame ({} bytes)", text.len());
            }
            Some(Err(e)) => {
                self.on_error(&e).await;
                self.on_close();
            }
            None => {
                info!("Connection closed by peer");
                self.on_close();
            }
        }
    }

    fn on_frame(&mut self, bytes: &[u8]) {
        let frame = match self.codec.decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping frame: {}", e);
                return;
            }
        };

        if self.pending.try_resolve(&frame) {
            self.settle();
            return;
        }

        for handler in self.handlers.snapshot() {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(&frame))) {
                Ok(PushOutcome::Handled) => return,
                Ok(PushOutcome::Ignored) => {}
                Err(_) => error!("Push handler panicked"),
            }
        }
        debug!("No handler claimed pushed frame ({} bytes)", bytes.len());
    }

    async fn send(
        &mut self,
        payload: K::Payload,
        waiter: Box<dyn Waiter<K::Frame>>,
        timeout: Duration,
    ) {
        if let Some(state) = self.state.get().disconnected() {
            waiter.reject(TetherError::disconnected(state));
            return;
        }

        let frame = match self.codec.encode(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                waiter.reject(e);
                return;
            }
        };

        let id = self.pending.insert(waiter, timeout);
        if self.state.get() != ConnectionState::FETCHING {
            self.transition(ConnectionState::FETCHING);
        }

        let written = match self.transport.as_mut() {
            Some(transport) => transport.send(frame).await,
            None => Err(TetherError::Transport("No live transport".into())),
        };
        match written {
            Ok(()) => debug!("Sent {}", id),
            Err(e) => {
                self.on_error(&e).await;
                self.on_close();
            }
        }
    }

    /// Apply a state transition; entering a Disconnected state aborts every
    /// pending request.
    fn transition(&mut self, next: ConnectionState) {
        self.state.set(next);

        if let Some(reason) = next.disconnected() {
            let reason = self.state.get().disconnected().unwrap_or(reason);
            let aborted = self.pending.abort_all(reason);
            if aborted > 0 {
                debug!("Aborted {} pending request(s): {}", aborted, reason);
            }
        }
    }

    fn settle(&mut self) {
        if self.pending.is_empty() && self.state.get() == ConnectionState::FETCHING {
            self.transition(ConnectionState::READY);
        }
    }

    async fn shutdown(&mut self) {
        let aborted = self.pending.abort_all(Disconnected::Closed);
        debug!("Shutting down, aborted {} pending request(s)", aborted);
        self.reconnect_at = None;
        self.state.dispose();
        self.handlers.clear();

        if let Some(mut transport) = self.transport.take() {
            match timeout(self.config.connect_timeout, transport.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("Error closing transport: {}", e),
                Err(_) => debug!("Timed out closing transport"),
            }
        }
        info!("Connection to {} closed", self.config.url);
    }
}

async fn next_inbound(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<Inbound>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
