//! Chat message types.
//!
//! A [`MessageDraft`] is what a client sends; it is validated into a
//! [`ValidDraft`] before the router touches any shared state. Once the history
//! log accepts it, it becomes an immutable [`ChatMessage`] with a sequence
//! number that records its arrival order at the relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelayError;
use crate::ids::ParticipantId;

/// A routed message as stored in the history log and pushed to clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Arrival order at the relay, starting at 1.
    pub seq: u64,
    /// Sender.
    pub from: ParticipantId,
    /// Recipient.
    pub to: ParticipantId,
    /// Opaque payload. The relay never looks inside.
    pub body: Value,
    /// RFC 3339 arrival time (UTC, millisecond precision).
    pub sent_at: String,
}

impl ChatMessage {
    /// Whether `{from, to}` equals `{a, b}` as an unordered pair.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.from.as_str() == a && self.to.as_str() == b)
            || (self.from.as_str() == b && self.to.as_str() == a)
    }
}

/// Unvalidated `send_message` payload.
///
/// Every field is an untyped optional value at the wire level so that a
/// missing or wrongly typed field is reported as a malformed message rather
/// than a parse failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageDraft {
    /// Declared sender. Must be a non-empty string.
    pub from: Option<Value>,
    /// Intended recipient. Must be a non-empty string.
    pub to: Option<Value>,
    /// Opaque payload. `null` counts as missing.
    pub body: Option<Value>,
}

/// A draft that passed validation.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidDraft {
    /// Sender.
    pub from: ParticipantId,
    /// Recipient.
    pub to: ParticipantId,
    /// Opaque payload.
    pub body: Value,
}

impl MessageDraft {
    /// Check required fields and the serialized body size.
    pub fn validate(self, max_body_bytes: usize) -> Result<ValidDraft, RelayError> {
        let from = required_identity(self.from, "from")?;
        let to = required_identity(self.to, "to")?;
        let body = self
            .body
            .ok_or_else(|| RelayError::malformed("body", "is missing"))?;

        let size = serde_json::to_string(&body)?.len();
        if size > max_body_bytes {
            return Err(RelayError::PayloadTooLarge {
                size,
                max: max_body_bytes,
            });
        }

        Ok(ValidDraft { from, to, body })
    }
}

fn required_identity(
    value: Option<Value>,
    field: &'static str,
) -> Result<ParticipantId, RelayError> {
    let id = match value {
        None | Some(Value::Null) => return Err(RelayError::malformed(field, "is missing")),
        Some(Value::String(s)) => ParticipantId::from_string(s),
        Some(_) => return Err(RelayError::malformed(field, "must be a string")),
    };
    if id.is_blank() {
        return Err(RelayError::malformed(field, "is empty"));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn draft(value: Value) -> MessageDraft {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn valid_draft_passes() {
        let valid = draft(json!({"from": "a", "to": "b", "body": [12, 99, 7]}))
            .validate(1024)
            .unwrap();
        assert_eq!(valid.from.as_str(), "a");
        assert_eq!(valid.to.as_str(), "b");
        assert_eq!(valid.body, json!([12, 99, 7]));
    }

    #[test]
    fn missing_to_is_malformed() {
        let err = draft(json!({"from": "a", "body": "hi"}))
            .validate(1024)
            .unwrap_err();
        assert_matches!(err, RelayError::MalformedMessage { field: "to", .. });
    }

    #[test]
    fn blank_from_is_malformed() {
        let err = draft(json!({"from": " ", "to": "b", "body": "hi"}))
            .validate(1024)
            .unwrap_err();
        assert_eq!(err, RelayError::malformed("from", "is empty"));
    }

    #[test]
    fn non_string_identity_is_malformed() {
        let err = draft(json!({"from": "a", "to": 42, "body": "hi"}))
            .validate(1024)
            .unwrap_err();
        assert_eq!(err, RelayError::malformed("to", "must be a string"));

        let err = draft(json!({"from": {}, "to": "b", "body": "hi"}))
            .validate(1024)
            .unwrap_err();
        assert_eq!(err, RelayError::malformed("from", "must be a string"));
    }

    #[test]
    fn null_identity_is_missing() {
        let err = draft(json!({"from": null, "to": "b", "body": "hi"}))
            .validate(1024)
            .unwrap_err();
        assert_eq!(err, RelayError::malformed("from", "is missing"));
    }

    #[test]
    fn null_body_is_malformed() {
        let err = draft(json!({"from": "a", "to": "b", "body": null}))
            .validate(1024)
            .unwrap_err();
        assert_matches!(err, RelayError::MalformedMessage { field: "body", .. });
    }

    #[test]
    fn oversized_body_rejected() {
        let err = draft(json!({"from": "a", "to": "b", "body": "x".repeat(100)}))
            .validate(16)
            .unwrap_err();
        assert_matches!(err, RelayError::PayloadTooLarge { max: 16, .. });
    }

    #[test]
    fn pair_match_is_unordered() {
        let msg = ChatMessage {
            seq: 1,
            from: "a".into(),
            to: "b".into(),
            body: json!("hi"),
            sent_at: "2026-01-01T00:00:00.000Z".into(),
        };
        assert!(msg.is_between("a", "b"));
        assert!(msg.is_between("b", "a"));
        assert!(!msg.is_between("a", "c"));
        assert!(!msg.is_between("a", "a"));
    }

    #[test]
    fn chat_message_wire_shape() {
        let msg = ChatMessage {
            seq: 7,
            from: "a".into(),
            to: "b".into(),
            body: json!({"cipher": [1, 2]}),
            sent_at: "2026-01-01T00:00:00.000Z".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["seq"], 7);
        assert_eq!(value["sentAt"], "2026-01-01T00:00:00.000Z");
        assert_eq!(value["body"]["cipher"][1], 2);
    }
}
