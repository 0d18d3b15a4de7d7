//! Protocol Messages
//!
//! Typed shapes of everything that crosses the wire between the chat client and
//! the assistant server. Inbound frames decode into [`InboundEvent`]; user input
//! leaves as a [`ChatRequest`].
//!
//! # Wire Shape
//!
//! Every frame is a single JSON object tagged by `type`:
//!
//! ```text
//! in   {"type":"meta",  "conversation_id": "...", "title": "..."?}
//! in   {"type":"token", "message_id": "...", "content": "..."}
//! in   {"type":"done",  "message_id": "..."}
//! in   {"type":"text",  "content": "<raw frame>"}        (degraded, see codec)
//! out  {"user_input": "...", "conversation_id": "..."|null, "response_mode": "text_stream"}
//! ```
//!
//! Identifiers are opaque to the client. The server may send them as JSON
//! strings or integers; both decode to the same string form.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Accept an identifier written either as a JSON string or a JSON integer.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Signed(i64),
        Unsigned(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Signed(n) => n.to_string(),
        RawId::Unsigned(n) => n.to_string(),
    })
}

/// Turn (message) identifier
///
/// Assistant turns get their identifier from the server (`message_id`);
/// user turns are identified locally with a random UUID.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId(#[serde(deserialize_with = "string_or_number")] pub String);

impl TurnId {
    /// Generate a fresh client-side identifier
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Borrow the identifier text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TurnId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Server-assigned conversation identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(#[serde(deserialize_with = "string_or_number")] pub String);

impl ConversationId {
    /// Borrow the identifier text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Opaque credential a connection is bound to
///
/// The token is never printed: `Debug` and `Display` redact it so that
/// identities can appear in structured log fields safely.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Wrap a token issued by the external auth flow
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for building the connection endpoint
    #[must_use]
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Identity(***)")
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Who authored a turn
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Local user input
    User,
    /// Streamed assistant output
    Assistant,
}

/// Events decoded from inbound frames
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Correlates (and optionally renames) the active conversation
    Meta {
        /// Conversation the session is now talking in
        conversation_id: ConversationId,
        /// Server-side title, if one has been assigned
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    /// Incremental assistant text
    Token {
        /// Turn this fragment belongs to
        message_id: TurnId,
        /// Text to append
        content: String,
    },

    /// Assistant turn finished streaming
    Done {
        /// Turn that completed
        message_id: TurnId,
    },

    /// Raw text; also what a malformed frame degrades to
    Text {
        /// Frame content
        content: String,
    },
}

impl InboundEvent {
    /// Short name of the event kind, for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Meta { .. } => "meta",
            Self::Token { .. } => "token",
            Self::Done { .. } => "done",
            Self::Text { .. } => "text",
        }
    }
}

/// How the server should deliver the response
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Token-by-token text stream followed by `done`
    #[default]
    TextStream,
}

impl ResponseMode {
    /// Wire spelling
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TextStream => "text_stream",
        }
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text_stream" | "stream" => Ok(Self::TextStream),
            other => Err(format!("unknown response mode: {other}")),
        }
    }
}

/// Outbound request submitting user input
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// What the user typed
    pub user_input: String,
    /// Conversation to continue; `None` asks the server to start a new one
    pub conversation_id: Option<ConversationId>,
    /// Delivery mode for the response
    pub response_mode: ResponseMode,
}

impl ChatRequest {
    /// Build a streaming request
    pub fn new(user_input: impl Into<String>, conversation_id: Option<ConversationId>) -> Self {
        Self {
            user_input: user_input.into(),
            conversation_id,
            response_mode: ResponseMode::default(),
        }
    }

    /// Override the response mode
    #[must_use]
    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_id_unique() {
        let id1 = TurnId::new();
        let id2 = TurnId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_identity_is_redacted() {
        let identity = Identity::new("secret-token");
        assert_eq!(format!("{identity:?}"), "Identity(***)");
        assert_eq!(identity.to_string(), "***");
        assert_eq!(identity.token(), "secret-token");
    }

    #[test]
    fn test_numeric_ids_decode_as_strings() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"type":"token","message_id":42,"content":"hi"}"#).unwrap();
        assert_eq!(
            event,
            InboundEvent::Token {
                message_id: TurnId::from("42"),
                content: "hi".to_string(),
            }
        );
    }

    #[test]
    fn test_meta_title_optional() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"type":"meta","conversation_id":"c1"}"#).unwrap();
        assert!(matches!(event, InboundEvent::Meta { title: None, .. }));

        let event: InboundEvent =
            serde_json::from_str(r#"{"type":"meta","conversation_id":"c1","title":null}"#)
                .unwrap();
        assert!(matches!(event, InboundEvent::Meta { title: None, .. }));
    }

    #[test]
    fn test_request_serializes_null_conversation() {
        let request = ChatRequest::new("hello", None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["conversation_id"], serde_json::Value::Null);
        assert_eq!(value["response_mode"], "text_stream");
    }

    #[test]
    fn test_response_mode_parse() {
        assert_eq!(
            "text_stream".parse::<ResponseMode>(),
            Ok(ResponseMode::TextStream)
        );
        assert!("carrier_pigeon".parse::<ResponseMode>().is_err());
    }
}
