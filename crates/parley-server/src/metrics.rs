//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Returns the handle used to render `/metrics`. Fails if a recorder is
/// already installed in this process.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REFUSED_TOTAL: &str = "ws_connections_refused_total";
/// Connection lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Messages appended to history and routed (counter).
pub const MESSAGES_ROUTED_TOTAL: &str = "messages_routed_total";
/// Echoes or deliveries dropped on a full or closed queue (counter).
pub const DELIVERIES_DROPPED_TOTAL: &str = "deliveries_dropped_total";
/// Inbound events answered with `request.rejected` (counter, labels: code).
pub const REQUESTS_REJECTED_TOTAL: &str = "requests_rejected_total";
