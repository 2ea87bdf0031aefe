//! Wire encoding of events and actions.
//!
//! Every frame shares one envelope:
//!
//! ```text
//! { "syncId": "<correlation id>", "data": { "type": "<discriminator>", ... } }
//! ```
//!
//! Pushed events use the sync id `"-1"`. Replies to client actions echo the
//! client's sync id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CourierError, CourierResult};
use crate::event::EventKind;

/// Sync id stamped on server-initiated event frames.
pub const EVENT_SYNC_ID: &str = "-1";

// =============================================================================
// Envelopes
// =============================================================================

/// A server-to-client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outgoing {
    pub sync_id: String,
    pub data: Value,
}

impl Outgoing {
    pub fn new(sync_id: impl Into<String>, data: Value) -> Self {
        Self {
            sync_id: sync_id.into(),
            data,
        }
    }

    /// Wraps an encoded event payload.
    pub fn event(data: Value) -> Self {
        Self::new(EVENT_SYNC_ID, data)
    }
}

/// A client-to-server action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    #[serde(default)]
    pub sync_id: String,
    pub command: String,
    #[serde(default)]
    pub sub_command: Option<String>,
    #[serde(default)]
    pub content: Value,
}

// =============================================================================
// Codec
// =============================================================================

/// Polymorphic encode/decode between domain objects and the wire.
pub trait Codec: Send + Sync {
    /// Encodes an event payload. Total over the closed event set.
    fn encode_event(&self, event: &EventKind) -> CourierResult<Value>;

    /// Decodes an event payload, rejecting unknown discriminators.
    fn decode_event(&self, value: &Value) -> CourierResult<EventKind>;

    /// Serializes a frame to text.
    fn encode_envelope(&self, frame: &Outgoing) -> CourierResult<String>;

    /// Parses an inbound action frame.
    fn decode_action(&self, text: &str) -> CourierResult<ActionEnvelope>;
}

/// Shared codec handle.
pub type BoxedCodec = Arc<dyn Codec>;

/// JSON codec keyed on the `type` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_event(&self, event: &EventKind) -> CourierResult<Value> {
        serde_json::to_value(event)
            .map_err(|e| CourierError::internal(format!("failed to encode {}: {e}", event.type_name())))
    }

    fn decode_event(&self, value: &Value) -> CourierResult<EventKind> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CourierError::invalid("missing event discriminator 'type'"))?;

        if !EventKind::TYPE_NAMES.contains(&tag) {
            return Err(CourierError::UnsupportedEventType(tag.to_string()));
        }

        EventKind::deserialize(value)
            .map_err(|e| CourierError::invalid(format!("malformed {tag}: {e}")))
    }

    fn encode_envelope(&self, frame: &Outgoing) -> CourierResult<String> {
        serde_json::to_string(frame).map_err(|e| CourierError::internal(e.to_string()))
    }

    fn decode_action(&self, text: &str) -> CourierResult<ActionEnvelope> {
        let envelope: ActionEnvelope = serde_json::from_str(text)
            .map_err(|e| CourierError::invalid(format!("malformed action frame: {e}")))?;
        if envelope.command.is_empty() {
            return Err(CourierError::invalid("action frame without command"));
        }
        Ok(envelope)
    }
}
