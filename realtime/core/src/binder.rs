//! Session Binding
//!
//! Correlates `meta` events with the conversation list. The binder holds
//! identifiers and titles only; turn content lives in the assembler.
//!
//! ```text
//! meta(id, title?) ──▶ known id?  ── yes ──▶ title differs? ──▶ reveal (once)
//!                          │
//!                          no ──▶ prepend entry (empty title) ──▶ reveal
//!                          │
//!              unbound session? ──▶ bind to id
//! ```
//!
//! Title reveals run elsewhere (see [`crate::title_reveal`]); the binder only
//! guards them so the same conversation is never revealed twice concurrently.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::messages::ConversationId;

/// Title shown when the server never named a new conversation
pub const UNTITLED: &str = "Untitled";

// ============================================================================
// Core Types
// ============================================================================

/// One conversation in the list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Server-assigned identifier
    pub id: ConversationId,
    /// Display title (may be mid-reveal)
    pub title: String,
    /// When the client first learned of it, or the server's creation time
    pub created_at: DateTime<Utc>,
}

impl ConversationEntry {
    fn pending(id: ConversationId, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: String::new(),
            created_at,
        }
    }
}

/// A conversation as listed by the server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Server-assigned identifier
    pub id: ConversationId,
    /// Server title, if any
    #[serde(default)]
    pub title: Option<String>,
    /// Server creation time; defaults to now
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A title transition the caller should animate
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealRequest {
    /// Conversation to relabel
    pub conversation_id: ConversationId,
    /// Final title
    pub title: String,
}

/// What a `meta` event changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindingUpdate {
    /// The conversation was new and has been added to the list
    pub added: bool,
    /// The active binding changed to this conversation
    pub bound: bool,
    /// A title reveal should start
    pub reveal: Option<RevealRequest>,
}

// ============================================================================
// Binder
// ============================================================================

/// Conversation list, active binding and reveal guards
#[derive(Debug, Default)]
pub struct SessionBinder {
    /// Most recent first
    entries: Vec<ConversationEntry>,
    active: Option<ConversationId>,
    revealing: HashSet<ConversationId>,
}

impl SessionBinder {
    /// Empty, unbound
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a `meta` event
    pub fn apply_meta(&mut self, id: &ConversationId, title: Option<&str>) -> BindingUpdate {
        let title = title.filter(|t| !t.is_empty());
        let mut update = BindingUpdate::default();

        match self.entries.iter().position(|e| &e.id == id) {
            Some(position) => {
                if let Some(t) = title.filter(|t| self.entries[position].title != *t) {
                    update.reveal = self.guard_reveal(id, t);
                }
            }
            None => {
                info!(conversation = %id, "New conversation");
                self.entries
                    .insert(0, ConversationEntry::pending(id.clone(), Utc::now()));
                update.added = true;
                update.reveal = self.guard_reveal(id, title.unwrap_or(UNTITLED));
            }
        }

        match &self.active {
            Some(current) if current == id => {}
            Some(current) => {
                debug!(from = %current, to = %id, "Server moved the session to another conversation");
                self.active = Some(id.clone());
                update.bound = true;
            }
            None => {
                debug!(conversation = %id, "Session bound");
                self.active = Some(id.clone());
                update.bound = true;
            }
        }

        update
    }

    /// Register conversations listed by the server that are not yet known
    ///
    /// New entries start with an empty title and get a reveal each. The list
    /// stays ordered most-recent-first.
    pub fn hydrate(
        &mut self,
        listed: impl IntoIterator<Item = ConversationSummary>,
    ) -> Vec<RevealRequest> {
        let mut reveals = Vec::new();

        for summary in listed {
            if self.is_known(&summary.id) {
                continue;
            }
            let created_at = summary.created_at.unwrap_or_else(Utc::now);
            self.entries
                .push(ConversationEntry::pending(summary.id.clone(), created_at));

            let title = summary
                .title
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| UNTITLED.to_string());
            if let Some(reveal) = self.guard_reveal(&summary.id, &title) {
                reveals.push(reveal);
            }
        }

        self.entries
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reveals
    }

    /// Whether `id` is already in the list
    #[must_use]
    pub fn is_known(&self, id: &ConversationId) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    /// Conversation the session is bound to
    #[must_use]
    pub fn active(&self) -> Option<&ConversationId> {
        self.active.as_ref()
    }

    /// Bind explicitly, e.g. when resuming a listed conversation
    pub fn bind(&mut self, id: ConversationId) {
        self.active = Some(id);
    }

    /// Return to the unbound state; the next `meta` binds
    pub fn unbind(&mut self) {
        self.active = None;
    }

    /// Conversation list, most recent first
    #[must_use]
    pub fn entries(&self) -> &[ConversationEntry] {
        &self.entries
    }

    /// Look up one entry
    #[must_use]
    pub fn get(&self, id: &ConversationId) -> Option<&ConversationEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Set the displayed title; false if the conversation is unknown
    pub fn set_display_title(&mut self, id: &ConversationId, title: &str) -> bool {
        match self.entries.iter_mut().find(|e| &e.id == id) {
            Some(entry) => {
                title.clone_into(&mut entry.title);
                true
            }
            None => false,
        }
    }

    /// Whether a reveal is running for `id`
    #[must_use]
    pub fn is_revealing(&self, id: &ConversationId) -> bool {
        self.revealing.contains(id)
    }

    /// Release the reveal guard (finished or cancelled)
    pub fn finish_reveal(&mut self, id: &ConversationId) {
        self.revealing.remove(id);
    }

    /// Release every reveal guard
    pub fn finish_all_reveals(&mut self) {
        self.revealing.clear();
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.active = None;
        self.revealing.clear();
    }

    fn guard_reveal(&mut self, id: &ConversationId, title: &str) -> Option<RevealRequest> {
        if !self.revealing.insert(id.clone()) {
            debug!(conversation = %id, "Title reveal already running");
            return None;
        }
        Some(RevealRequest {
            conversation_id: id.clone(),
            title: title.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn cid(s: &str) -> ConversationId {
        ConversationId::from(s)
    }

    #[test]
    fn test_new_conversation_is_prepended_and_bound() {
        let mut binder = SessionBinder::new();
        binder.apply_meta(&cid("old"), Some("Old"));
        binder.bind(cid("old"));
        binder.unbind();

        let update = binder.apply_meta(&cid("c1"), Some("Trip plan"));

        assert!(update.added);
        assert!(update.bound);
        assert_eq!(
            update.reveal,
            Some(RevealRequest {
                conversation_id: cid("c1"),
                title: "Trip plan".to_string(),
            })
        );
        assert_eq!(binder.entries()[0].id, cid("c1"));
        assert_eq!(binder.entries()[0].title, "");
        assert_eq!(binder.active(), Some(&cid("c1")));
    }

    #[test]
    fn test_missing_title_reveals_untitled() {
        let mut binder = SessionBinder::new();
        let update = binder.apply_meta(&cid("c1"), None);
        assert_eq!(update.reveal.unwrap().title, UNTITLED);
    }

    #[test]
    fn test_known_conversation_same_title_is_quiet() {
        let mut binder = SessionBinder::new();
        binder.apply_meta(&cid("c1"), Some("Trip"));
        binder.set_display_title(&cid("c1"), "Trip");
        binder.finish_reveal(&cid("c1"));

        let update = binder.apply_meta(&cid("c1"), Some("Trip"));
        assert_eq!(update, BindingUpdate::default());
        assert_eq!(binder.entries().len(), 1);
    }

    #[test]
    fn test_known_conversation_retitle_reveals_once() {
        let mut binder = SessionBinder::new();
        binder.apply_meta(&cid("c1"), Some("Trip"));
        binder.set_display_title(&cid("c1"), "Trip");
        binder.finish_reveal(&cid("c1"));

        let first = binder.apply_meta(&cid("c1"), Some("Trip to Oslo"));
        assert!(first.reveal.is_some());
        assert!(!first.added);

        let second = binder.apply_meta(&cid("c1"), Some("Trip to Oslo"));
        assert!(second.reveal.is_none());
        assert!(binder.is_revealing(&cid("c1")));

        binder.set_display_title(&cid("c1"), "Trip to Oslo");
        binder.finish_reveal(&cid("c1"));
        assert!(binder.apply_meta(&cid("c1"), Some("Trip to Oslo")).reveal.is_none());
    }

    #[test]
    fn test_known_conversation_without_title_keeps_label() {
        let mut binder = SessionBinder::new();
        binder.apply_meta(&cid("c1"), Some("Trip"));
        binder.finish_reveal(&cid("c1"));

        assert!(binder.apply_meta(&cid("c1"), None).reveal.is_none());
        assert!(binder.apply_meta(&cid("c1"), Some("")).reveal.is_none());
    }

    #[test]
    fn test_bound_session_follows_server() {
        let mut binder = SessionBinder::new();
        assert!(binder.apply_meta(&cid("c1"), None).bound);
        assert!(!binder.apply_meta(&cid("c1"), None).bound);

        let update = binder.apply_meta(&cid("c2"), None);
        assert!(update.bound);
        assert_eq!(binder.active(), Some(&cid("c2")));
    }

    #[test]
    fn test_hydrate_orders_most_recent_first() {
        let mut binder = SessionBinder::new();
        binder.apply_meta(&cid("live"), None);

        let at = |day| Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap();
        let reveals = binder.hydrate(vec![
            ConversationSummary {
                id: cid("older"),
                title: Some("Older".to_string()),
                created_at: Some(at(1)),
            },
            ConversationSummary {
                id: cid("live"),
                title: Some("Ignored".to_string()),
                created_at: Some(at(3)),
            },
            ConversationSummary {
                id: cid("newer"),
                title: None,
                created_at: Some(at(2)),
            },
        ]);

        let order: Vec<&str> = binder.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["live", "newer", "older"]);
        assert_eq!(reveals.len(), 2);
        assert!(reveals
            .iter()
            .any(|r| r.conversation_id == cid("newer") && r.title == UNTITLED));
        assert!(binder.entries().iter().skip(1).all(|e| e.title.is_empty()));
    }
}
