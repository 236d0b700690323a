//! Graceful shutdown via a shared `CancellationToken`.
//!
//! The listener and every WebSocket session hold a clone of the token. On
//! cancel the listener stops accepting, sessions send a close frame and run
//! their lifecycle teardown.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long to wait for tasks before giving up.
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the process-wide shutdown token.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Clone of the token for a task to watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Signal every holder of the token.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been signalled.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Signal shutdown, then wait up to `timeout` for `handles` to finish.
    ///
    /// Tasks still running after the timeout are left to the runtime.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "draining server tasks"
        );

        if tokio::time::timeout(timeout, futures::future::join_all(handles))
            .await
            .is_err()
        {
            warn!("shutdown timed out after {timeout:?}, some tasks may still be running");
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
