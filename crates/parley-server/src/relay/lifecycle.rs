//! Per-connection state machine.
//!
//! ```text
//! Connecting ──identify──▶ Identified
//!     │                        │
//!     └──── transport close ───┴──▶ Closed
//! ```
//!
//! Only an `Identified` connection may send messages or ask for history.
//! `Closed` is terminal: the bound identity is unregistered (if this
//! connection still owns it) and further events are ignored.

use std::sync::Arc;

use metrics::counter;
use parley_core::{ParticipantId, RelayError};
use tracing::{debug, info, warn};

use super::Relay;
use super::connection::ClientConnection;
use super::protocol::{InboundEvent, ServerEvent, parse_frame};
use crate::metrics::REQUESTS_REJECTED_TOTAL;

/// Where a connection is in its life.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, no identity yet.
    Connecting,
    /// Bound to a participant in the registry.
    Identified(ParticipantId),
    /// Transport gone.
    Closed,
}

/// Drives one connection through [`SessionState`].
pub struct ConnectionLifecycle {
    connection: Arc<ClientConnection>,
    relay: Arc<Relay>,
    state: SessionState,
}

impl ConnectionLifecycle {
    /// Start a lifecycle in `Connecting`.
    pub fn new(connection: Arc<ClientConnection>, relay: Arc<Relay>) -> Self {
        Self {
            connection,
            relay,
            state: SessionState::Connecting,
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Bound identity, once identified.
    pub fn identity(&self) -> Option<&ParticipantId> {
        match &self.state {
            SessionState::Identified(identity) => Some(identity),
            _ => None,
        }
    }

    /// Parse and handle one inbound text frame.
    ///
    /// Any error is answered with `request.rejected` on this connection before
    /// being returned, so callers only need to log it.
    pub async fn handle_frame(&mut self, text: &str) -> Result<(), RelayError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let result = match parse_frame(text, self.relay.max_frame_bytes()) {
            Ok(event) => self.handle_event(event).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            self.reject(err);
        }
        result
    }

    /// Handle one parsed inbound event. Errors are not pushed to the client.
    pub async fn handle_event(&mut self, event: InboundEvent) -> Result<(), RelayError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        debug!(connection_id = %self.connection.id, kind = event.kind(), "inbound event");

        match event {
            InboundEvent::Identify { identity, token } => self.identify(identity, token).await,
            InboundEvent::SendMessage(draft) => {
                let _ = self.require_identity()?;
                let _ = self.relay.router().route(draft, &self.connection).await?;
                Ok(())
            }
            InboundEvent::RequestHistory {
                participant_a,
                participant_b,
            } => {
                let _ = self.require_identity()?;
                let messages = self.relay.router().history(&participant_a, &participant_b);
                debug!(
                    connection_id = %self.connection.id,
                    participant_a,
                    participant_b,
                    count = messages.len(),
                    "history served"
                );
                self.push(&ServerEvent::history_result(
                    &participant_a,
                    &participant_b,
                    &messages,
                ));
                Ok(())
            }
        }
    }

    /// Move to `Closed`, releasing the registry binding if this connection
    /// still owns it. Safe to call more than once.
    pub async fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        if let SessionState::Identified(identity) = previous {
            let released = self
                .relay
                .registry()
                .unregister(&identity, &self.connection.id)
                .await;
            info!(
                identity = %identity,
                connection_id = %self.connection.id,
                released,
                "participant offline"
            );
        }
    }

    /// `identity.accepted` is queued before the registry binding is made, so
    /// it always precedes any delivery routed to the new binding.
    async fn identify(
        &mut self,
        identity: String,
        token: Option<String>,
    ) -> Result<(), RelayError> {
        if let SessionState::Identified(current) = &self.state {
            return Err(RelayError::AlreadyIdentified {
                identity: current.to_string(),
            });
        }

        let identity = ParticipantId::from_string(identity);
        if identity.is_blank() {
            return Err(RelayError::InvalidRequest {
                message: "identity must not be empty".into(),
            });
        }

        if !self
            .relay
            .verifier()
            .verify(&identity, token.as_deref())
            .await
        {
            warn!(identity = %identity, connection_id = %self.connection.id, "identity refused");
            return Err(RelayError::Unauthenticated {
                identity: identity.into_inner(),
            });
        }

        self.push(&ServerEvent::identity_accepted(&identity));
        let displaced = self
            .relay
            .registry()
            .register(identity.clone(), self.connection.clone())
            .await;
        if let Some(previous) = displaced {
            info!(
                identity = %identity,
                previous = %previous.id,
                current = %self.connection.id,
                "identity moved to a new connection"
            );
            if let Some(json) = ServerEvent::identity_superseded(&identity).to_json() {
                let _ = previous.send(json);
            }
        }

        info!(identity = %identity, connection_id = %self.connection.id, "participant online");
        self.state = SessionState::Identified(identity);
        Ok(())
    }

    fn require_identity(&self) -> Result<&ParticipantId, RelayError> {
        self.identity().ok_or(RelayError::NotIdentified)
    }

    fn reject(&self, err: &RelayError) {
        counter!(REQUESTS_REJECTED_TOTAL, "code" => err.code()).increment(1);
        debug!(
            connection_id = %self.connection.id,
            code = err.code(),
            error = %err,
            "request rejected"
        );
        self.push(&ServerEvent::rejected(err));
    }

    fn push(&self, event: &ServerEvent) {
        if let Some(json) = event.to_json() {
            if !self.connection.send(json) {
                warn!(
                    connection_id = %self.connection.id,
                    event_type = %event.event_type,
                    "failed to enqueue event (channel full or closed)"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AllowAll, StaticTokens};
    use crate::relay::connection::test_support::{connection, drain};
    use assert_matches::assert_matches;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    type Rx = mpsc::Receiver<Arc<String>>;

    fn relay() -> Arc<Relay> {
        Arc::new(Relay::new(Arc::new(AllowAll), 4096, 1024))
    }

    fn session(relay: &Arc<Relay>, id: &str) -> (ConnectionLifecycle, Rx) {
        let (conn, rx) = connection(id, 64);
        (ConnectionLifecycle::new(conn, relay.clone()), rx)
    }

    async fn identified(relay: &Arc<Relay>, id: &str, identity: &str) -> (ConnectionLifecycle, Rx) {
        let (mut lc, mut rx) = session(relay, id);
        lc.handle_frame(&json!({"type": "identify", "identity": identity}).to_string())
            .await
            .unwrap();
        let _ = drain(&mut rx);
        (lc, rx)
    }

    fn send(from: &str, to: &str, body: &str) -> String {
        json!({"type": "send_message", "from": from, "to": to, "body": body}).to_string()
    }

    fn types(events: &[Value]) -> Vec<&str> {
        events.iter().filter_map(|e| e["type"].as_str()).collect()
    }

    #[tokio::test]
    async fn identify_registers_and_acknowledges() {
        let relay = relay();
        let (mut lc, mut rx) = session(&relay, "c1");
        assert_eq!(lc.state(), &SessionState::Connecting);

        lc.handle_frame(r#"{"type":"identify","identity":"alice"}"#)
            .await
            .unwrap();

        assert_eq!(lc.identity().map(ParticipantId::as_str), Some("alice"));
        let events = drain(&mut rx);
        assert_eq!(types(&events), vec!["identity.accepted"]);
        assert_eq!(events[0]["data"]["identity"], "alice");
        assert!(relay.registry().lookup("alice").await.is_some());
    }

    #[tokio::test]
    async fn events_before_identify_are_rejected() {
        let relay = relay();
        let (mut lc, mut rx) = session(&relay, "c1");

        let err = lc.handle_frame(&send("alice", "bob", "hi")).await.unwrap_err();
        assert_eq!(err, RelayError::NotIdentified);
        let err = lc
            .handle_frame(r#"{"type":"request_history","participantA":"a","participantB":"b"}"#)
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::NotIdentified);

        let events = drain(&mut rx);
        assert_eq!(types(&events), vec!["request.rejected", "request.rejected"]);
        assert_eq!(events[0]["data"]["code"], "NOT_IDENTIFIED");
        assert!(relay.history().is_empty());
    }

    #[tokio::test]
    async fn second_identify_is_rejected() {
        let relay = relay();
        let (mut lc, mut rx) = identified(&relay, "c1", "alice").await;

        let err = lc
            .handle_frame(r#"{"type":"identify","identity":"mallory"}"#)
            .await
            .unwrap_err();
        assert_matches!(err, RelayError::AlreadyIdentified { identity } if identity == "alice");
        assert_eq!(drain(&mut rx)[0]["data"]["code"], "ALREADY_IDENTIFIED");
        assert!(relay.registry().lookup("mallory").await.is_none());
    }

    #[tokio::test]
    async fn blank_identity_is_rejected() {
        let relay = relay();
        let (mut lc, _rx) = session(&relay, "c1");
        let err = lc
            .handle_frame(r#"{"type":"identify","identity":"  "}"#)
            .await
            .unwrap_err();
        assert_matches!(err, RelayError::InvalidRequest { .. });
        assert_eq!(lc.state(), &SessionState::Connecting);
    }

    #[tokio::test]
    async fn unauthenticated_identity_stays_connecting() {
        let relay = Arc::new(Relay::new(
            Arc::new(StaticTokens::new([("alice", "secret")])),
            4096,
            1024,
        ));
        let (mut lc, mut rx) = session(&relay, "c1");

        let err = lc
            .handle_frame(r#"{"type":"identify","identity":"alice","token":"wrong"}"#)
            .await
            .unwrap_err();
        assert_matches!(err, RelayError::Unauthenticated { .. });
        assert_eq!(lc.state(), &SessionState::Connecting);
        assert!(relay.registry().lookup("alice").await.is_none());
        assert_eq!(drain(&mut rx)[0]["data"]["code"], "UNAUTHENTICATED");

        lc.handle_frame(r#"{"type":"identify","identity":"alice","token":"secret"}"#)
            .await
            .unwrap();
        assert!(relay.registry().lookup("alice").await.is_some());
    }

    #[tokio::test]
    async fn malformed_send_is_rejected_without_logging() {
        let relay = relay();
        let (mut lc, mut rx) = identified(&relay, "c1", "alice").await;

        let err = lc
            .handle_frame(r#"{"type":"send_message","from":"alice","body":"hi"}"#)
            .await
            .unwrap_err();
        assert_matches!(err, RelayError::MalformedMessage { field: "to", .. });

        let events = drain(&mut rx);
        assert_eq!(types(&events), vec!["request.rejected"]);
        assert_eq!(events[0]["data"]["code"], "MALFORMED_MESSAGE");
        assert!(relay.history().is_empty());
    }

    #[tokio::test]
    async fn wrongly_typed_identity_fields_are_malformed() {
        let relay = relay();
        let (mut lc, mut rx) = identified(&relay, "c1", "alice").await;

        let err = lc
            .handle_frame(r#"{"type":"send_message","from":"alice","to":42,"body":"hi"}"#)
            .await
            .unwrap_err();
        assert_matches!(err, RelayError::MalformedMessage { field: "to", .. });

        let err = lc
            .handle_frame(r#"{"type":"send_message","from":["alice"],"to":"bob","body":"hi"}"#)
            .await
            .unwrap_err();
        assert_matches!(err, RelayError::MalformedMessage { field: "from", .. });

        let events = drain(&mut rx);
        assert_eq!(types(&events), vec!["request.rejected", "request.rejected"]);
        assert!(events.iter().all(|e| e["data"]["code"] == "MALFORMED_MESSAGE"));
        assert!(relay.history().is_empty());
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let relay = relay();
        let (mut lc, mut rx) = session(&relay, "c1");
        let err = lc.handle_frame("{{{").await.unwrap_err();
        assert_matches!(err, RelayError::InvalidRequest { .. });
        assert_eq!(drain(&mut rx)[0]["data"]["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn offline_message_then_history() {
        let relay = relay();
        let (mut alice, mut alice_rx) = identified(&relay, "ca", "alice").await;

        alice.handle_frame(&send("alice", "bob", "hi")).await.unwrap();
        let echoed = drain(&mut alice_rx);
        assert_eq!(types(&echoed), vec!["message.delivered"]);
        assert_eq!(echoed[0]["data"]["from"], "alice");
        assert_eq!(echoed[0]["data"]["to"], "bob");
        assert_eq!(echoed[0]["data"]["body"], "hi");

        let (mut bob, mut bob_rx) = identified(&relay, "cb", "bob").await;
        assert!(drain(&mut bob_rx).is_empty());

        bob.handle_frame(
            r#"{"type":"request_history","participantA":"bob","participantB":"alice"}"#,
        )
        .await
        .unwrap();
        let events = drain(&mut bob_rx);
        assert_eq!(types(&events), vec!["history.result"]);
        let messages = events[0]["data"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["from"], "alice");
        assert_eq!(messages[0]["body"], "hi");
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[tokio::test]
    async fn close_unregisters_and_ignores_later_events() {
        let relay = relay();
        let (mut lc, mut rx) = identified(&relay, "c1", "alice").await;

        lc.close().await;
        assert_eq!(lc.state(), &SessionState::Closed);
        assert!(relay.registry().lookup("alice").await.is_none());

        lc.handle_frame(&send("alice", "bob", "late")).await.unwrap();
        assert!(drain(&mut rx).is_empty());
        assert!(relay.history().is_empty());

        lc.close().await;
    }

    #[tokio::test]
    async fn close_while_connecting() {
        let relay = relay();
        let (mut lc, _rx) = session(&relay, "c1");
        lc.close().await;
        assert_eq!(lc.state(), &SessionState::Closed);
        assert!(relay.registry().is_empty().await);
    }

    #[tokio::test]
    async fn reconnect_moves_delivery_to_new_connection() {
        let relay = relay();
        let (mut old, mut old_rx) = identified(&relay, "old", "alice").await;
        let (_new, mut new_rx) = identified(&relay, "new", "alice").await;

        let superseded = drain(&mut old_rx);
        assert_eq!(types(&superseded), vec!["identity.superseded"]);

        // The displaced connection closing must not unbind its successor.
        old.close().await;
        let bound = relay.registry().lookup("alice").await.unwrap();
        assert_eq!(bound.id.as_str(), "new");

        let (mut bob, _bob_rx) = identified(&relay, "cb", "bob").await;
        bob.handle_frame(&send("bob", "alice", "welcome back")).await.unwrap();

        assert!(drain(&mut old_rx).is_empty());
        let received = drain(&mut new_rx);
        assert_eq!(types(&received), vec!["message.delivered"]);
        assert_eq!(received[0]["data"]["body"], "welcome back");
    }

    #[tokio::test]
    async fn acceptance_precedes_first_delivery() {
        let relay = relay();
        let (mut bob, _bob_rx) = identified(&relay, "cb", "bob").await;
        let (mut alice, mut alice_rx) = session(&relay, "ca");

        alice
            .handle_frame(r#"{"type":"identify","identity":"alice"}"#)
            .await
            .unwrap();
        bob.handle_frame(&send("bob", "alice", "first")).await.unwrap();

        let events = drain(&mut alice_rx);
        assert_eq!(types(&events), vec!["identity.accepted", "message.delivered"]);
    }

    #[tokio::test]
    async fn disconnect_then_reidentify() {
        let relay = relay();
        let (mut first, _first_rx) = identified(&relay, "c1", "alice").await;
        first.close().await;

        let (_second, mut second_rx) = identified(&relay, "c2", "alice").await;
        let (mut bob, _bob_rx) = identified(&relay, "cb", "bob").await;
        bob.handle_frame(&send("bob", "alice", "hello")).await.unwrap();

        assert_eq!(types(&drain(&mut second_rx)), vec!["message.delivered"]);
    }
}
