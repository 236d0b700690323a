//! `/health` endpoint body.

use parley_core::ParticipantId;
use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Open WebSocket connections, identified or not.
    pub connections: usize,
    /// Number of participants currently bound in the registry.
    pub online_participants: usize,
    /// Those participants, sorted.
    pub online: Vec<ParticipantId>,
    /// Messages in the history log.
    pub history_size: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    connections: usize,
    online: Vec<ParticipantId>,
    history_size: usize,
) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        online_participants: online.len(),
        online,
        history_size,
    }
}
