//! Relay error type and wire error codes.
//!
//! Every variant is recoverable: the connection task turns it into a
//! `request.rejected` event for the originating client and keeps serving.
//! Nothing here ever reaches the shared registry or history log.

use thiserror::Error;

// ── Error code constants ────────────────────────────────────────────

/// Frame is not valid JSON or names an unknown event type.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
/// `send_message` payload is missing `from`, `to` or `body`.
pub const MALFORMED_MESSAGE: &str = "MALFORMED_MESSAGE";
/// Frame exceeds the configured size limit.
pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
/// Event requires an identified connection.
pub const NOT_IDENTIFIED: &str = "NOT_IDENTIFIED";
/// Connection already declared an identity.
pub const ALREADY_IDENTIFIED: &str = "ALREADY_IDENTIFIED";
/// Credential check refused the declared identity.
pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";

/// Error raised while handling a single inbound event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Frame could not be parsed into an inbound event.
    #[error("invalid request: {message}")]
    InvalidRequest {
        /// Parser diagnostic.
        message: String,
    },

    /// A `send_message` field is missing or empty.
    #[error("malformed message: {field} {reason}")]
    MalformedMessage {
        /// Offending field (`from`, `to` or `body`).
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Inbound frame or message body larger than allowed.
    #[error("payload too large ({size} > {max} bytes)")]
    PayloadTooLarge {
        /// Actual size in bytes.
        size: usize,
        /// Configured limit in bytes.
        max: usize,
    },

    /// Event arrived before `identify`.
    #[error("connection has not identified")]
    NotIdentified,

    /// `identify` arrived on an identified connection.
    #[error("connection already identified as '{identity}'")]
    AlreadyIdentified {
        /// Identity bound earlier.
        identity: String,
    },

    /// The credential collaborator rejected the identity.
    #[error("identity '{identity}' is not authenticated")]
    Unauthenticated {
        /// Identity that was refused.
        identity: String,
    },
}

impl RelayError {
    /// Shorthand for a malformed-message error.
    #[must_use]
    pub fn malformed(field: &'static str, reason: &'static str) -> Self {
        Self::MalformedMessage { field, reason }
    }

    /// Machine-readable error code sent to the client.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => INVALID_REQUEST,
            Self::MalformedMessage { .. } => MALFORMED_MESSAGE,
            Self::PayloadTooLarge { .. } => PAYLOAD_TOO_LARGE,
            Self::NotIdentified => NOT_IDENTIFIED,
            Self::AlreadyIdentified { .. } => ALREADY_IDENTIFIED,
            Self::Unauthenticated { .. } => UNAUTHENTICATED,
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidRequest {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn codes_are_stable() {
        assert_eq!(RelayError::NotIdentified.code(), "NOT_IDENTIFIED");
        assert_eq!(
            RelayError::malformed("to", "is missing").code(),
            "MALFORMED_MESSAGE"
        );
        assert_eq!(
            RelayError::PayloadTooLarge { size: 10, max: 5 }.code(),
            "PAYLOAD_TOO_LARGE"
        );
        assert_eq!(
            RelayError::Unauthenticated {
                identity: "x".into()
            }
            .code(),
            "UNAUTHENTICATED"
        );
    }

    #[test]
    fn malformed_display_names_field() {
        let err = RelayError::malformed("body", "is missing");
        assert_eq!(err.to_string(), "malformed message: body is missing");
    }

    #[test]
    fn already_identified_display() {
        let err = RelayError::AlreadyIdentified {
            identity: "alice".into(),
        };
        assert!(err.to_string().contains("alice"));
        assert_eq!(err.code(), ALREADY_IDENTIFIED);
    }

    #[test]
    fn json_error_converts_to_invalid_request() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err: RelayError = json_err.into();
        assert_matches!(err, RelayError::InvalidRequest { .. });
        assert_eq!(err.code(), INVALID_REQUEST);
    }
}
