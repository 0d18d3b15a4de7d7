//! Chat Client
//!
//! Thin façade a UI drives. It owns the [`Connection`], the [`TurnAssembler`],
//! the [`SessionBinder`] and the running title reveals, and turns every inbound
//! event into one [`ClientUpdate`] the UI can render from.
//!
//! # Flow
//!
//! ```text
//! submit(text) ──▶ TurnAssembler::push_user ──▶ Connection::send
//!
//! Connection ──event──▶ meta  ──▶ SessionBinder ──▶ TitleReveal ──steps──┐
//!                       token ──▶ TurnAssembler                           │
//!                       done  ──▶ TurnAssembler                           │
//!                       text  ──▶ surfaced as-is                          │
//!                                                                         ▼
//!                                                      next_update() ◀────┘
//! ```

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::binder::{ConversationEntry, ConversationSummary, RevealRequest, SessionBinder};
use crate::config::{ClientConfig, ConfigError};
use crate::messages::{ChatRequest, ConversationId, Identity, InboundEvent, TurnId};
use crate::title_reveal::{RevealStep, TitleReveal};
use crate::transport::{
    Connection, ConnectionState, Connector, TransportError, WebSocketConnector,
};
use crate::turns::{Turn, TurnAssembler, TurnChange};

/// Errors surfaced to the UI
#[derive(Debug, Error)]
pub enum ClientError {
    /// Nothing to send
    #[error("Input is empty")]
    EmptyInput,

    /// No session identity registered
    #[error("No session identity; call open() first")]
    MissingIdentity,

    /// Transport could not be set up
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Configuration was rejected
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What changed after processing one event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientUpdate {
    /// An assistant turn started streaming
    TurnStarted {
        /// The new turn
        turn_id: TurnId,
    },
    /// Text was appended to a streaming turn
    TurnAppended {
        /// The growing turn
        turn_id: TurnId,
    },
    /// An assistant turn finished
    TurnCompleted {
        /// The finished turn
        turn_id: TurnId,
    },
    /// A `meta` event was correlated
    ConversationCorrelated {
        /// Conversation from the event
        conversation_id: ConversationId,
        /// It was new and has been prepended to the list
        added: bool,
        /// The session is now bound to it
        bound: bool,
    },
    /// A conversation's displayed title changed
    TitleChanged {
        /// Conversation relabelled
        conversation_id: ConversationId,
        /// Title now displayed
        title: String,
        /// The reveal is complete
        finished: bool,
    },
    /// Raw text from the server, including malformed frames
    RawText {
        /// Frame content
        content: String,
    },
    /// The event changed nothing
    Ignored,
}

enum Incoming {
    Event(InboundEvent),
    Reveal(RevealStep),
    Closed,
}

/// One chat session: connection, turns, conversations and titles
pub struct ChatClient {
    connection: Connection,
    config: ClientConfig,
    /// Identity of the open session
    identity: Option<Identity>,
    /// Identity the displayed turns and conversations belong to; survives `close`
    view_owner: Option<Identity>,
    events_tx: mpsc::UnboundedSender<InboundEvent>,
    events_rx: mpsc::UnboundedReceiver<InboundEvent>,
    turns: TurnAssembler,
    binder: SessionBinder,
    reveal: TitleReveal,
    awaiting_response: bool,
}

impl ChatClient {
    /// Client talking WebSocket to `config.transport.endpoint`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let connector = WebSocketConnector::new(&config.transport.endpoint)?;
        Ok(Self::with_connector(config, Arc::new(connector)))
    }

    /// Client over any connector
    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let connection = Connection::new(connector, config.transport.clone());
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reveal = TitleReveal::new(config.title_reveal_interval);

        Self {
            connection,
            config,
            identity: None,
            view_owner: None,
            events_tx,
            events_rx,
            turns: TurnAssembler::new(),
            binder: SessionBinder::new(),
            reveal,
            awaiting_response: false,
        }
    }

    /// Open the session for `identity`
    ///
    /// Idempotent for the current identity. An identity other than the one
    /// the view belongs to starts from an empty view: turns, conversations and
    /// pending events of the previous one are discarded, also after `close`.
    pub fn open(&mut self, identity: Identity) {
        if self
            .view_owner
            .as_ref()
            .is_some_and(|owner| *owner != identity)
        {
            info!("Session identity changed; resetting view");
            self.reset_view();
            self.turns.clear();
            self.binder.clear();
        }
        self.view_owner = Some(identity.clone());
        self.identity = Some(identity.clone());
        self.connection.open(identity, self.events_tx.clone());
    }

    /// Tear the session down; later events from it are ignored
    ///
    /// The view is kept for display until an identity other than its owner
    /// opens.
    pub fn close(&mut self) {
        self.connection.close();
        self.identity = None;
        self.reset_view();
    }

    /// Record `text` as a user turn and send it
    ///
    /// # Errors
    ///
    /// `EmptyInput` for blank text, `MissingIdentity` before `open`.
    pub fn submit(&mut self, text: &str) -> Result<TurnId, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::EmptyInput);
        }
        if self.identity.is_none() {
            warn!("Submit without a session identity rejected");
            return Err(ClientError::MissingIdentity);
        }

        let turn_id = self.turns.push_user(text);
        let request = ChatRequest::new(text, self.binder.active().cloned())
            .with_mode(self.config.response_mode);
        self.connection.send(request);
        self.awaiting_response = true;

        debug!(turn = %turn_id, "User turn submitted");
        Ok(turn_id)
    }

    /// Wait for the next event or title step and apply it
    ///
    /// Pends while the session is quiet. Returns `None` if an internal channel
    /// has closed.
    pub async fn next_update(&mut self) -> Option<ClientUpdate> {
        let incoming = tokio::select! {
            biased;
            event = self.events_rx.recv() => event.map_or(Incoming::Closed, Incoming::Event),
            step = self.reveal.next_step() => step.map_or(Incoming::Closed, Incoming::Reveal),
        };

        match incoming {
            Incoming::Event(event) => Some(self.handle_event(event)),
            Incoming::Reveal(step) => Some(self.apply_reveal_step(step)),
            Incoming::Closed => None,
        }
    }

    /// Apply whatever is ready without waiting
    pub fn drain_updates(&mut self) -> Vec<ClientUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            updates.push(self.handle_event(event));
        }
        while let Some(step) = self.reveal.try_next_step() {
            updates.push(self.apply_reveal_step(step));
        }
        updates
    }

    /// Route one inbound event
    pub fn handle_event(&mut self, event: InboundEvent) -> ClientUpdate {
        match event {
            InboundEvent::Meta {
                conversation_id,
                title,
            } => {
                let update = self.binder.apply_meta(&conversation_id, title.as_deref());
                if let Some(request) = update.reveal {
                    self.start_reveal(request);
                }
                ClientUpdate::ConversationCorrelated {
                    conversation_id,
                    added: update.added,
                    bound: update.bound,
                }
            }
            InboundEvent::Token {
                message_id,
                content,
            } => {
                let change = self.turns.apply_token(&message_id, &content);
                if matches!(change, TurnChange::Started(_) | TurnChange::Appended(_)) {
                    self.awaiting_response = false;
                }
                change.into()
            }
            InboundEvent::Done { message_id } => self.turns.apply_done(&message_id).into(),
            InboundEvent::Text { content } => {
                debug!(len = content.len(), "Raw text from server");
                ClientUpdate::RawText { content }
            }
        }
    }

    /// Show a previously fetched conversation and continue it
    pub fn resume(&mut self, conversation_id: ConversationId, history: Vec<Turn>) {
        info!(conversation = %conversation_id, turns = history.len(), "Resuming conversation");
        self.turns.load_history(history);
        self.binder.bind(conversation_id);
        self.awaiting_response = false;
    }

    /// Start over; the next `meta` binds the session
    pub fn new_conversation(&mut self) {
        self.turns.clear();
        self.binder.unbind();
        self.awaiting_response = false;
    }

    /// Register conversations listed by the server and reveal their titles
    pub fn hydrate_conversations(&mut self, listed: Vec<ConversationSummary>) {
        for request in self.binder.hydrate(listed) {
            self.start_reveal(request);
        }
    }

    /// Turns in the active view
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        self.turns.turns()
    }

    /// Whether an assistant turn is streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.turns.is_streaming()
    }

    /// Whether a submit is still waiting for its first token
    #[must_use]
    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    /// Conversation list, most recent first
    #[must_use]
    pub fn conversations(&self) -> &[ConversationEntry] {
        self.binder.entries()
    }

    /// Conversation the session is bound to
    #[must_use]
    pub fn active_conversation(&self) -> Option<&ConversationId> {
        self.binder.active()
    }

    /// Whether `id` is already in the conversation list
    #[must_use]
    pub fn is_known(&self, id: &ConversationId) -> bool {
        self.binder.is_known(id)
    }

    /// Transport lifecycle state
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The underlying connection
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    fn start_reveal(&mut self, request: RevealRequest) {
        self.reveal.start(request);
    }

    fn apply_reveal_step(&mut self, step: RevealStep) -> ClientUpdate {
        let RevealStep {
            conversation_id,
            title,
            finished,
            ..
        } = step;

        if finished {
            self.binder.finish_reveal(&conversation_id);
            self.reveal.finished(&conversation_id);
        }
        if !self.binder.set_display_title(&conversation_id, &title) {
            return ClientUpdate::Ignored;
        }

        ClientUpdate::TitleChanged {
            conversation_id,
            title,
            finished,
        }
    }

    /// Drop pending events and reveals, and reconnect the inbound channel
    fn reset_view(&mut self) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.events_tx = events_tx;
        self.events_rx = events_rx;
        self.reveal.cancel_all();
        self.binder.finish_all_reveals();
        self.awaiting_response = false;
    }
}

impl From<TurnChange> for ClientUpdate {
    fn from(change: TurnChange) -> Self {
        match change {
            TurnChange::Started(turn_id) => Self::TurnStarted { turn_id },
            TurnChange::Appended(turn_id) => Self::TurnAppended { turn_id },
            TurnChange::Completed(turn_id) => Self::TurnCompleted { turn_id },
            TurnChange::Unchanged => Self::Ignored,
        }
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("connection", &self.connection)
            .field("turns", &self.turns.len())
            .field("conversations", &self.binder.entries().len())
            .field("awaiting_response", &self.awaiting_response)
            .finish_non_exhaustive()
    }
}
