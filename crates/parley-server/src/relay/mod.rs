//! Presence-aware routing core.
//!
//! [`Relay`] owns the shared state for one server: the registry, the history
//! log, the router over both, and the credential check. It is created at
//! server start and handed to every connection's [`ConnectionLifecycle`].

pub mod connection;
pub mod history;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod router;

use std::sync::Arc;

pub use connection::ClientConnection;
pub use history::HistoryLog;
pub use lifecycle::{ConnectionLifecycle, SessionState};
pub use protocol::{InboundEvent, ServerEvent};
pub use registry::ConnectionRegistry;
pub use router::{MessageRouter, RouteOutcome};

use crate::auth::IdentityVerifier;

/// Shared relay state.
pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    history: Arc<HistoryLog>,
    router: MessageRouter,
    verifier: Arc<dyn IdentityVerifier>,
    max_frame_bytes: usize,
}

impl Relay {
    /// Create a relay with empty registry and history.
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        max_frame_bytes: usize,
        max_body_bytes: usize,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let history = Arc::new(HistoryLog::new());
        let router = MessageRouter::new(registry.clone(), history.clone(), max_body_bytes);
        Self {
            registry,
            history,
            router,
            verifier,
            max_frame_bytes,
        }
    }

    /// Presence registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Conversation history.
    pub fn history(&self) -> &Arc<HistoryLog> {
        &self.history
    }

    /// Message router.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Credential check.
    pub fn verifier(&self) -> &Arc<dyn IdentityVerifier> {
        &self.verifier
    }

    /// Largest inbound frame accepted, in bytes.
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}
