//! Message routing: log, echo, deliver.

use std::sync::Arc;

use metrics::counter;
use parley_core::{ChatMessage, MessageDraft, RelayError};
use tracing::{debug, warn};

use super::connection::ClientConnection;
use super::history::HistoryLog;
use super::protocol::ServerEvent;
use super::registry::ConnectionRegistry;
use crate::metrics::{DELIVERIES_DROPPED_TOTAL, MESSAGES_ROUTED_TOTAL};

/// What happened to a routed message.
#[derive(Clone, Debug)]
pub struct RouteOutcome {
    /// The message as stored in the history log.
    pub message: ChatMessage,
    /// Whether the sender's connection accepted the echo.
    pub echoed: bool,
    /// Whether a live recipient connection accepted it.
    pub delivered: bool,
}

/// The only writer of the history log and the only registry reader for
/// delivery.
pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    history: Arc<HistoryLog>,
    max_body_bytes: usize,
}

impl MessageRouter {
    /// Create a router over shared registry and history.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        history: Arc<HistoryLog>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            registry,
            history,
            max_body_bytes,
        }
    }

    /// Route a message sent from `origin`.
    ///
    /// An invalid draft is rejected before anything is logged or echoed.
    /// Otherwise the message is appended, echoed exactly once to `origin`, and
    /// pushed to the recipient's connection if one is registered and it is not
    /// `origin` itself. An offline recipient is not an error.
    pub async fn route(
        &self,
        draft: MessageDraft,
        origin: &ClientConnection,
    ) -> Result<RouteOutcome, RelayError> {
        let draft = draft.validate(self.max_body_bytes)?;
        let message = self.history.append(draft);
        counter!(MESSAGES_ROUTED_TOTAL).increment(1);

        let Some(json) = ServerEvent::message_delivered(&message).to_json() else {
            return Ok(RouteOutcome {
                message,
                echoed: false,
                delivered: false,
            });
        };

        let echoed = origin.send(json.clone());
        if !echoed {
            counter!(DELIVERIES_DROPPED_TOTAL).increment(1);
            warn!(connection_id = %origin.id, seq = message.seq, "local echo dropped");
        }

        let delivered = match self.registry.lookup(&message.to).await {
            Some(recipient) if recipient.id != origin.id => {
                let sent = recipient.send(json);
                if !sent {
                    counter!(DELIVERIES_DROPPED_TOTAL).increment(1);
                    warn!(
                        connection_id = %recipient.id,
                        to = %message.to,
                        seq = message.seq,
                        "live delivery dropped"
                    );
                }
                sent
            }
            Some(_) => false,
            None => {
                debug!(to = %message.to, seq = message.seq, "recipient offline, logged only");
                false
            }
        };

        debug!(
            from = %message.from,
            to = %message.to,
            seq = message.seq,
            delivered,
            "message routed"
        );
        Ok(RouteOutcome {
            message,
            echoed,
            delivered,
        })
    }

    /// Conversation between two participants, oldest first.
    pub fn history(&self, a: &str, b: &str) -> Vec<ChatMessage> {
        self.history.query(a, b)
    }
}
