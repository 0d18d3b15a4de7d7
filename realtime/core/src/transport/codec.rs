//! Protocol Codec
//!
//! Translates between raw text frames and typed protocol messages. The rest of
//! the crate never touches JSON directly.
//!
//! Decoding is total: a frame that is not valid JSON, or is JSON of an unknown
//! shape, degrades into [`InboundEvent::Text`] carrying the raw frame so the
//! caller still observes exactly one event per frame. Encoding is total as well,
//! since the request shape is fixed.

use crate::messages::{ChatRequest, InboundEvent};

/// Decode one inbound frame
#[must_use]
pub fn decode(raw: &str) -> InboundEvent {
    match serde_json::from_str::<InboundEvent>(raw) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, len = raw.len(), "Degrading malformed frame to raw text");
            InboundEvent::Text {
                content: raw.to_string(),
            }
        }
    }
}

/// Encode one outbound request
#[must_use]
pub fn encode(request: &ChatRequest) -> String {
    serde_json::json!({
        "user_input": request.user_input,
        "conversation_id": request.conversation_id.as_ref().map(|id| id.as_str()),
        "response_mode": request.response_mode.as_str(),
    })
    .to_string()
}
