//! Verified webhook event as delivered to subscribers and the relay.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An event decoded from a verified webhook body.
///
/// Only the `event` tag (e.g. `"room_started"`) is interpreted; every other
/// top-level field is carried through untouched so subscribers see the
/// payload exactly as the media server sent it. Immutable once created and
/// shared behind an `Arc` during fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Event kind as sent by the platform.
    pub event: String,
    /// Remaining payload fields (`room`, `participant`, `id`, `createdAt`, ...).
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WebhookEvent {
    /// Creates an event with the given kind and no extra fields.
    #[must_use]
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            fields: Map::new(),
        }
    }

    /// Returns the platform's event id, when present.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    /// Serializes the event to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if a field fails to serialize.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
