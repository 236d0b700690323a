//! Connection registry: who is online, and where to reach them.

use std::collections::HashMap;
use std::sync::Arc;

use parley_core::{ConnectionId, ParticipantId};
use tokio::sync::RwLock;
use tracing::debug;

use super::connection::ClientConnection;

/// Maps each identified participant to its current connection.
///
/// At most one binding per identity. A later `register` for the same identity
/// replaces the earlier handle and hands it back to the caller, which decides
/// how to tell the displaced connection.
pub struct ConnectionRegistry {
    bindings: RwLock<HashMap<ParticipantId, Arc<ClientConnection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Bind `identity` to `connection`.
    ///
    /// Returns the handle that was displaced, if it belonged to a different
    /// connection. Re-registering the same connection is a no-op.
    pub async fn register(
        &self,
        identity: ParticipantId,
        connection: Arc<ClientConnection>,
    ) -> Option<Arc<ClientConnection>> {
        let mut bindings = self.bindings.write().await;
        debug!(identity = %identity, connection_id = %connection.id, "binding identity");
        bindings
            .insert(identity, connection.clone())
            .filter(|previous| previous.id != connection.id)
    }

    /// Current connection for `identity`, if any.
    pub async fn lookup(&self, identity: &str) -> Option<Arc<ClientConnection>> {
        self.bindings.read().await.get(identity).cloned()
    }

    /// Remove the binding for `identity` if `owner` still holds it.
    ///
    /// Returns whether a binding was removed. A connection that was displaced
    /// by a newer registration cannot unbind its successor.
    pub async fn unregister(&self, identity: &str, owner: &ConnectionId) -> bool {
        let mut bindings = self.bindings.write().await;
        let owned = bindings.get(identity).is_some_and(|conn| &conn.id == owner);
        if owned {
            let _ = bindings.remove(identity);
            debug!(identity, connection_id = %owner, "unbound identity");
        } else {
            debug!(identity, connection_id = %owner, "stale unbind ignored");
        }
        owned
    }

    /// Number of online participants.
    pub async fn len(&self) -> usize {
        self.bindings.read().await.len()
    }

    /// Whether nobody is online.
    pub async fn is_empty(&self) -> bool {
        self.bindings.read().await.is_empty()
    }

    /// Sorted snapshot of online participants.
    pub async fn online(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.bindings.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
