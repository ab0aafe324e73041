//! WebSocket message types: envelope and commands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RegistrationEventType;

/// Top-level WebSocket message envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    /// Client-provided ID for requests; server-generated for events.
    pub id: String,
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: WsMessageType,
    /// ISO-8601 timestamp.
    pub timestamp: DateTime<Utc>,
    /// Variant-specific payload.
    pub payload: serde_json::Value,
}

impl WsMessage {
    /// Builds a server-originated message stamped with the current time.
    #[must_use]
    pub fn new(id: String, msg_type: WsMessageType, payload: serde_json::Value) -> Self {
        Self {
            id,
            msg_type,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Builds an error message answering request `id`.
    #[must_use]
    pub fn error(id: String, code: &str, message: &str) -> Self {
        Self::new(
            id,
            WsMessageType::Error,
            serde_json::json!({ "code": code, "message": message }),
        )
    }
}

/// Discriminator for WebSocket message types.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WsMessageType {
    /// Client → Server command.
    Command,
    /// Server → Client response to a command.
    Response,
    /// Server → Client registration event.
    Event,
    /// Server → Client error.
    Error,
}

/// Commands a client can send in a [`WsMessageType::Command`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WsCommand {
    /// Start receiving events for the given event IDs. `"*"` subscribes to
    /// every event.
    Subscribe {
        /// Event IDs, or `["*"]`.
        event_ids: Vec<String>,
        /// Kinds of change to forward; empty keeps the current filter.
        #[serde(default)]
        event_types: Vec<RegistrationEventType>,
    },
    /// Stop receiving events for the given event IDs.
    Unsubscribe {
        /// Event IDs to drop.
        event_ids: Vec<String>,
    },
    /// Non-binding admissibility check for one event.
    CheckAdmissible {
        /// Event to evaluate.
        event_id: String,
    },
}
