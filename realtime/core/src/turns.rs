//! Turn Assembly
//!
//! Folds the inbound token stream into an ordered list of conversation turns.
//! The assembler is the only thing that mutates turn content.
//!
//! Turns are addressed by identifier, never by position, so several assistant
//! turns can stream at once without interfering. An assistant turn exists only
//! once its first token arrives; `done` closes it for good.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::messages::{InboundEvent, Role, TurnId};

/// One turn in the active conversation view
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Identifier, fixed at creation
    pub id: TurnId,
    /// Author
    pub role: Role,
    /// Accumulated text
    pub content: String,
    /// Whether more tokens may still arrive
    pub in_progress: bool,
    /// When the turn was created (Unix timestamp ms)
    pub created_at: u64,
}

impl Turn {
    /// A completed user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role: Role::User,
            content: content.into(),
            in_progress: false,
            created_at: now_ms(),
        }
    }

    /// A completed assistant turn, as loaded from history
    pub fn assistant(id: TurnId, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: content.into(),
            in_progress: false,
            created_at: now_ms(),
        }
    }

    fn streaming(id: TurnId, first: &str) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: first.to_string(),
            in_progress: true,
            created_at: now_ms(),
        }
    }
}

/// What applying an event did to the turn list
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnChange {
    /// A new assistant turn was created from its first token
    Started(TurnId),
    /// Text was appended to a streaming turn
    Appended(TurnId),
    /// A streaming turn finished
    Completed(TurnId),
    /// Nothing changed
    Unchanged,
}

/// Ordered turn list plus an identifier index
#[derive(Debug, Default)]
pub struct TurnAssembler {
    turns: Vec<Turn>,
    index: HashMap<TurnId, usize>,
}

impl TurnAssembler {
    /// Empty view
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record local input immediately, before any network round-trip
    pub fn push_user(&mut self, content: impl Into<String>) -> TurnId {
        self.push(Turn::user(content))
    }

    /// Apply a token or done event; other kinds leave turns untouched
    pub fn apply(&mut self, event: &InboundEvent) -> TurnChange {
        match event {
            InboundEvent::Token {
                message_id,
                content,
            } => self.apply_token(message_id, content),
            InboundEvent::Done { message_id } => self.apply_done(message_id),
            InboundEvent::Meta { .. } | InboundEvent::Text { .. } => TurnChange::Unchanged,
        }
    }

    /// Append `delta` to turn `id`, creating it if unseen
    pub fn apply_token(&mut self, id: &TurnId, delta: &str) -> TurnChange {
        let Some(&position) = self.index.get(id) else {
            debug!(turn = %id, "Assistant turn started");
            let id = self.push(Turn::streaming(id.clone(), delta));
            return TurnChange::Started(id);
        };

        let turn = &mut self.turns[position];
        if !turn.in_progress {
            warn!(turn = %id, role = ?turn.role, "Token for a finished turn ignored");
            return TurnChange::Unchanged;
        }

        turn.content.push_str(delta);
        TurnChange::Appended(id.clone())
    }

    /// Mark turn `id` finished; unknown or already-finished ids are no-ops
    pub fn apply_done(&mut self, id: &TurnId) -> TurnChange {
        match self.index.get(id).map(|&position| &mut self.turns[position]) {
            Some(turn) if turn.in_progress => {
                turn.in_progress = false;
                debug!(turn = %id, len = turn.content.len(), "Assistant turn completed");
                TurnChange::Completed(id.clone())
            }
            Some(_) => TurnChange::Unchanged,
            None => {
                debug!(turn = %id, "Done for unknown turn ignored");
                TurnChange::Unchanged
            }
        }
    }

    /// Whether any assistant turn is still streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.turns
            .iter()
            .any(|t| t.role == Role::Assistant && t.in_progress)
    }

    /// Turns in creation order
    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Look up a turn
    #[must_use]
    pub fn get(&self, id: &TurnId) -> Option<&Turn> {
        self.index.get(id).map(|&position| &self.turns[position])
    }

    /// Number of turns
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the view is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Replace the view with a previously fetched history
    ///
    /// History turns are finished; any in-progress flag is cleared. Later
    /// duplicates of an identifier are skipped.
    pub fn load_history(&mut self, history: impl IntoIterator<Item = Turn>) {
        self.clear();
        for mut turn in history {
            if self.index.contains_key(&turn.id) {
                warn!(turn = %turn.id, "Duplicate turn in history skipped");
                continue;
            }
            turn.in_progress = false;
            self.push(turn);
        }
    }

    /// Drop all turns
    pub fn clear(&mut self) {
        self.turns.clear();
        self.index.clear();
    }

    fn push(&mut self, turn: Turn) -> TurnId {
        let id = turn.id.clone();
        self.index.insert(id.clone(), self.turns.len());
        self.turns.push(turn);
        id
    }
}

#[allow(clippy::cast_possible_truncation)]
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
