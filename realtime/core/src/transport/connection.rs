//! Connection
//!
//! A [`Connection`] is a handle to a driver task that exclusively owns the
//! link, the outbound buffer, the registered identity and inbound sink, and the
//! reconnect timer. Handles talk to the driver over a command channel and read
//! the lifecycle from a `watch` channel, so no state is shared or locked.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──open──▶ Connecting ──ok──▶ Open ──close/err──▶ Closed ──delay──▶ Connecting
//!   ▲                 │                                    │
//!   │                 └──────────fail/timeout──────────────┘
//!   └──────────────── close() from any state ───────────── GaveUp (attempts exhausted)
//! ```
//!
//! Only [`Connection::close`] returns to `Idle` and stops reconnecting.
//! Commands are processed before inbound frames. A write in flight keeps
//! listening for commands: `close()` abandons it and stops the flush, other
//! commands wait in arrival order until the write settles. A write that does
//! not settle within `write_timeout` counts as a lost link.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tracing::{debug, error, info, warn};

use crate::messages::{ChatRequest, Identity, InboundEvent};

use super::codec;
use super::config::TransportConfig;
use super::outbound::{OutboundBuffer, PushOutcome};
use super::traits::{Connector, FrameSink, FrameStream, Link, TransportError};

/// Where decoded inbound events are delivered
pub type EventSink = mpsc::UnboundedSender<InboundEvent>;

/// Connection lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No identity registered
    Idle,
    /// Connect attempt in flight
    Connecting,
    /// Link established
    Open,
    /// Link lost; reconnect pending
    Closed,
    /// Reconnect attempts exhausted; waits for `open` or `close`
    GaveUp,
}

/// Counters kept by the driver
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Requests written to a link
    pub sent: u64,
    /// Frames received from a link
    pub received: u64,
    /// Requests currently waiting in the outbound buffer
    pub buffered: usize,
    /// Requests lost to buffer overflow
    pub dropped: u64,
    /// Reconnects scheduled after a close or failed attempt
    pub reconnects: u64,
    /// Links successfully opened
    pub connections: u64,
}

enum Command {
    Open { identity: Identity, sink: EventSink },
    Send(ChatRequest),
    Close { done: Option<oneshot::Sender<()>> },
    Stats(oneshot::Sender<ConnectionStats>),
}

/// Handle to a managed, self-healing connection
///
/// Must be created inside a tokio runtime. Dropping the handle stops the
/// driver.
pub struct Connection {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Spawn the driver for `connector`
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, config: TransportConfig) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Idle);

        let driver = Driver {
            buffer: OutboundBuffer::new(config.outbound_capacity, config.overflow_policy),
            connector,
            config,
            commands: command_rx,
            state_tx,
            deferred: VecDeque::new(),
            identity: None,
            sink: None,
            outbound: None,
            inbound: None,
            pending_connect: None,
            reconnect_at: None,
            attempts: 0,
            stats: ConnectionStats::default(),
        };

        let task = tokio::spawn(driver.run());

        Self {
            commands,
            state,
            task,
        }
    }

    /// Bind to `identity` and deliver decoded events to `sink`
    ///
    /// Re-opening with the identity already bound is a no-op while connecting
    /// or open; a different identity tears the current link down first.
    pub fn open(&self, identity: Identity, sink: EventSink) {
        self.command(Command::Open { identity, sink });
    }

    /// Transmit now if open, otherwise queue behind earlier requests
    pub fn send(&self, request: ChatRequest) {
        self.command(Command::Send(request));
    }

    /// Tear down: cancel reconnects, close the link, clear the buffer
    pub fn close(&self) {
        self.command(Command::Close { done: None });
    }

    /// [`close`](Self::close) and wait until the link is shut
    pub async fn close_and_wait(&self) {
        let (done, rx) = oneshot::channel();
        self.command(Command::Close { done: Some(done) });
        let _ = rx.await;
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Subscribe to lifecycle changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Snapshot of the driver's counters
    pub async fn stats(&self) -> ConnectionStats {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Stats(tx));
        rx.await.unwrap_or_default()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            error!("Connection driver has stopped");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Link, TransportError>> + Send>>;

enum Step {
    Command(Option<Command>),
    Connected(Result<Link, TransportError>),
    Frame(Option<Result<String, TransportError>>),
    ReconnectDue,
}

/// How a single write settled
enum WriteOutcome {
    Written,
    Failed(TransportError),
    TimedOut,
    Interrupted,
}

struct Driver {
    connector: Arc<dyn Connector>,
    config: TransportConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Commands received while a write was in flight; `None` = channel closed
    deferred: VecDeque<Option<Command>>,
    state_tx: watch::Sender<ConnectionState>,
    identity: Option<Identity>,
    sink: Option<EventSink>,
    buffer: OutboundBuffer<ChatRequest>,
    outbound: Option<FrameSink>,
    inbound: Option<FrameStream>,
    pending_connect: Option<ConnectFuture>,
    reconnect_at: Option<Pin<Box<Sleep>>>,
    attempts: u32,
    stats: ConnectionStats,
}

impl Driver {
    async fn run(mut self) {
        loop {
            if let Some(command) = self.deferred.pop_front() {
                match command {
                    Some(command) => {
                        self.handle_command(command).await;
                        continue;
                    }
                    None => {
                        self.teardown().await;
                        break;
                    }
                }
            }

            let step = tokio::select! {
                biased;
                command = self.commands.recv() => Step::Command(command),
                result = connect_finished(&mut self.pending_connect) => Step::Connected(result),
                frame = next_frame(&mut self.inbound) => Step::Frame(frame),
                () = reconnect_due(&mut self.reconnect_at) => Step::ReconnectDue,
            };

            match step {
                Step::Command(None) => {
                    self.teardown().await;
                    break;
                }
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Connected(result) => {
                    self.pending_connect = None;
                    self.on_connect_result(result).await;
                }
                Step::Frame(Some(Ok(raw))) => self.on_frame(&raw),
                Step::Frame(Some(Err(e))) => {
                    warn!(error = %e, "Transport error");
                }
                Step::Frame(None) => {
                    info!("Connection closed by peer");
                    self.on_link_lost();
                }
                Step::ReconnectDue => {
                    self.reconnect_at = None;
                    self.start_connect();
                }
            }
        }
        debug!("Connection driver stopped");
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Connection state changed");
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { identity, sink } => self.open(identity, sink).await,
            Command::Send(request) => self.send(request).await,
            Command::Close { done } => {
                self.teardown().await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            Command::Stats(reply) => {
                let mut stats = self.stats.clone();
                stats.buffered = self.buffer.len();
                let _ = reply.send(stats);
            }
        }
    }

    async fn open(&mut self, identity: Identity, sink: EventSink) {
        if self.identity.as_ref() == Some(&identity) {
            match self.state() {
                ConnectionState::Connecting | ConnectionState::Open => {
                    debug!("Already bound to this identity; ignoring open");
                    return;
                }
                ConnectionState::Closed | ConnectionState::GaveUp | ConnectionState::Idle => {
                    info!("Reopening with the bound identity; connecting now");
                    self.sink = Some(sink);
                    self.reconnect_at = None;
                    self.attempts = 0;
                    self.start_connect();
                    return;
                }
            }
        }

        if self.identity.is_some() {
            info!("Switching identity; closing current connection");
            self.teardown().await;
        }

        self.identity = Some(identity);
        self.sink = Some(sink);
        self.attempts = 0;
        self.start_connect();
    }

    async fn send(&mut self, request: ChatRequest) {
        if self.identity.is_none() {
            warn!("No identity registered; dropping outbound request");
            return;
        }

        if self.outbound.is_none() {
            self.enqueue(request);
        } else if self.buffer.is_empty() {
            self.transmit(request).await;
        } else {
            self.enqueue(request);
            self.flush().await;
        }
    }

    fn enqueue(&mut self, request: ChatRequest) {
        let outcome = self.buffer.push(request);
        self.record_outcome(outcome);
        debug!(buffered = self.buffer.len(), "Request buffered until connected");
    }

    fn record_outcome(&mut self, outcome: PushOutcome) {
        if outcome.dropped() {
            self.stats.dropped += 1;
            warn!(
                ?outcome,
                capacity = self.buffer.capacity(),
                "Outbound buffer full; request dropped"
            );
        }
    }

    /// Write one request; on failure it goes back to the front of the buffer
    async fn transmit(&mut self, request: ChatRequest) -> bool {
        let Some(outbound) = self.outbound.as_mut() else {
            let outcome = self.buffer.requeue(request);
            self.record_outcome(outcome);
            return false;
        };

        let deadline = tokio::time::sleep(self.config.write_timeout());
        tokio::pin!(deadline);
        let mut write = outbound.send(codec::encode(&request));

        let outcome = loop {
            tokio::select! {
                biased;
                result = &mut write => {
                    break match result {
                        Ok(()) => WriteOutcome::Written,
                        Err(e) => WriteOutcome::Failed(e),
                    };
                }
                () = &mut deadline => break WriteOutcome::TimedOut,
                command = self.commands.recv() => match command {
                    Some(Command::Stats(reply)) => {
                        let mut stats = self.stats.clone();
                        stats.buffered = self.buffer.len();
                        let _ = reply.send(stats);
                    }
                    Some(command @ (Command::Open { .. } | Command::Send(_))) => {
                        self.deferred.push_back(Some(command));
                    }
                    interrupt => {
                        self.deferred.push_back(interrupt);
                        break WriteOutcome::Interrupted;
                    }
                },
            }
        };
        drop(write);

        match outcome {
            WriteOutcome::Written => {
                self.stats.sent += 1;
                return true;
            }
            WriteOutcome::Failed(e) => {
                warn!(error = %e, "Send failed; keeping request for the next connection");
            }
            WriteOutcome::TimedOut => {
                warn!(
                    timeout_ms = self.config.write_timeout_ms,
                    "Send stalled; treating link as lost"
                );
            }
            WriteOutcome::Interrupted => {
                debug!("Write abandoned for close");
                // half-written link: teardown must not wait on a graceful close
                self.outbound = None;
                let outcome = self.buffer.requeue(request);
                self.record_outcome(outcome);
                return false;
            }
        }

        let outcome = self.buffer.requeue(request);
        self.record_outcome(outcome);
        self.on_link_lost();
        false
    }

    async fn flush(&mut self) {
        let pending = self.buffer.len();
        if pending == 0 {
            return;
        }

        debug!(pending, "Flushing outbound buffer");
        while self.outbound.is_some() {
            let Some(request) = self.buffer.pop() else {
                break;
            };
            if !self.transmit(request).await {
                debug!(remaining = self.buffer.len(), "Flush interrupted");
                break;
            }
        }
    }

    fn start_connect(&mut self) {
        let Some(identity) = self.identity.clone() else {
            return;
        };

        self.set_state(ConnectionState::Connecting);

        let connector = Arc::clone(&self.connector);
        let timeout = self.config.connect_timeout();
        self.pending_connect = Some(Box::pin(async move {
            match tokio::time::timeout(timeout, connector.connect(&identity)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(timeout)),
            }
        }));
    }

    async fn on_connect_result(&mut self, result: Result<Link, TransportError>) {
        match result {
            Ok(link) => {
                self.outbound = Some(link.sink);
                self.inbound = Some(link.stream);
                self.attempts = 0;
                self.stats.connections += 1;
                self.set_state(ConnectionState::Open);
                info!(
                    connections = self.stats.connections,
                    buffered = self.buffer.len(),
                    "Connected"
                );
                self.flush().await;
            }
            Err(e) => {
                warn!(error = %e, attempt = self.attempts + 1, "Connect attempt failed");
                self.on_link_lost();
            }
        }
    }

    fn on_frame(&mut self, raw: &str) {
        self.stats.received += 1;
        let event = codec::decode(raw);
        debug!(kind = event.kind(), "Inbound event");

        match &self.sink {
            Some(sink) => {
                if sink.send(event).is_err() {
                    debug!("Inbound sink dropped; event discarded");
                }
            }
            None => debug!("No inbound sink registered; event discarded"),
        }
    }

    fn on_link_lost(&mut self) {
        self.outbound = None;
        self.inbound = None;

        if self.identity.is_none() {
            self.set_state(ConnectionState::Idle);
            return;
        }

        match self.config.reconnect.delay_for(self.attempts) {
            Some(delay) => {
                self.attempts += 1;
                self.stats.reconnects += 1;
                self.set_state(ConnectionState::Closed);
                info!(
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    attempt = self.attempts,
                    "Reconnect scheduled"
                );
                self.reconnect_at = Some(Box::pin(tokio::time::sleep(delay)));
            }
            None => {
                self.set_state(ConnectionState::GaveUp);
                error!(
                    attempts = self.attempts,
                    buffered = self.buffer.len(),
                    "Reconnect attempts exhausted; giving up"
                );
            }
        }
    }

    async fn teardown(&mut self) {
        self.reconnect_at = None;
        self.pending_connect = None;
        self.inbound = None;

        if let Some(mut outbound) = self.outbound.take() {
            let timeout = self.config.connect_timeout();
            match tokio::time::timeout(timeout, outbound.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Error closing link"),
                Err(_) => debug!("Timed out closing link"),
            }
        }

        let discarded = self.buffer.len();
        self.buffer.clear();
        self.identity = None;
        self.sink = None;
        self.attempts = 0;

        if self.state() != ConnectionState::Idle {
            info!(discarded, "Connection closed");
        }
        self.set_state(ConnectionState::Idle);
    }
}

async fn connect_finished(pending: &mut Option<ConnectFuture>) -> Result<Link, TransportError> {
    match pending {
        Some(connect) => connect.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_frame(inbound: &mut Option<FrameStream>) -> Option<Result<String, TransportError>> {
    match inbound {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
