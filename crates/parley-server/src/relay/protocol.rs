//! Wire format: inbound client events and outbound server events.
//!
//! Inbound frames are JSON objects tagged by `type`. The legacy names
//! `user_online`, `request_chat_history`, `currentUser` and `currentFriend` are
//! accepted as aliases.

use std::sync::Arc;

use parley_core::{ChatMessage, ConnectionId, MessageDraft, ParticipantId, RelayError};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::warn;

/// Sent to a new connection before anything else.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";
/// `identify` succeeded.
pub const IDENTITY_ACCEPTED: &str = "identity.accepted";
/// Another connection took over this connection's identity.
pub const IDENTITY_SUPERSEDED: &str = "identity.superseded";
/// A routed message (local echo or live delivery).
pub const MESSAGE_DELIVERED: &str = "message.delivered";
/// Answer to `request_history`.
pub const HISTORY_RESULT: &str = "history.result";
/// An inbound event was refused.
pub const REQUEST_REJECTED: &str = "request.rejected";

/// Event sent by a client.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Declare who this connection speaks for.
    #[serde(alias = "user_online")]
    Identify {
        /// Declared identity.
        #[serde(alias = "username")]
        identity: String,
        /// Credential for the identity check, if the deployment needs one.
        #[serde(default)]
        token: Option<String>,
    },
    /// Route a message to a peer.
    SendMessage(MessageDraft),
    /// Fetch the conversation between two participants.
    #[serde(alias = "request_chat_history")]
    RequestHistory {
        /// One side of the conversation.
        #[serde(rename = "participantA", alias = "currentUser")]
        participant_a: String,
        /// The other side.
        #[serde(rename = "participantB", alias = "currentFriend")]
        participant_b: String,
    },
}

impl InboundEvent {
    /// Wire name of the event, for logging and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Identify { .. } => "identify",
            Self::SendMessage(_) => "send_message",
            Self::RequestHistory { .. } => "request_history",
        }
    }
}

/// Parse one inbound text frame.
pub fn parse_frame(text: &str, max_size: usize) -> Result<InboundEvent, RelayError> {
    if text.len() > max_size {
        return Err(RelayError::PayloadTooLarge {
            size: text.len(),
            max: max_size,
        });
    }
    Ok(serde_json::from_str(text)?)
}

/// Server-pushed event envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerEvent {
    /// Event type (e.g. `message.delivered`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    /// Event payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ServerEvent {
    /// Create a new event stamped with the current UTC time.
    pub fn new(event_type: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: now_timestamp(),
            data,
        }
    }

    /// Greeting carrying the relay-assigned connection ID.
    pub fn connection_established(id: &ConnectionId) -> Self {
        Self::new(CONNECTION_ESTABLISHED, Some(json!({ "connectionId": id })))
    }

    /// `identify` was honored.
    pub fn identity_accepted(identity: &ParticipantId) -> Self {
        Self::new(IDENTITY_ACCEPTED, Some(json!({ "identity": identity })))
    }

    /// This connection no longer receives traffic for `identity`.
    pub fn identity_superseded(identity: &ParticipantId) -> Self {
        Self::new(IDENTITY_SUPERSEDED, Some(json!({ "identity": identity })))
    }

    /// A routed message.
    pub fn message_delivered(message: &ChatMessage) -> Self {
        Self::new(MESSAGE_DELIVERED, serde_json::to_value(message).ok())
    }

    /// Conversation between two participants, oldest first.
    pub fn history_result(a: &str, b: &str, messages: &[ChatMessage]) -> Self {
        Self::new(
            HISTORY_RESULT,
            Some(json!({
                "participantA": a,
                "participantB": b,
                "messages": messages,
            })),
        )
    }

    /// An inbound event was refused.
    pub fn rejected(err: &RelayError) -> Self {
        Self::new(
            REQUEST_REJECTED,
            Some(json!({ "code": err.code(), "message": err.to_string() })),
        )
    }

    /// Serialize once for fan-out to several connections.
    pub fn to_json(&self) -> Option<Arc<String>> {
        match serde_json::to_string(self) {
            Ok(json) => Some(Arc::new(json)),
            Err(e) => {
                warn!(event_type = %self.event_type, error = %e, "failed to serialize event");
                None
            }
        }
    }
}

/// Current UTC time as RFC 3339 with millisecond precision.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
