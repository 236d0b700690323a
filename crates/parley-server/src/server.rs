//! `RelayServer`: Axum HTTP + WebSocket front end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parley_core::ConnectionId;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::IdentityVerifier;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_CONNECTIONS_REFUSED_TOTAL;
use crate::relay::Relay;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{ConnectionSlots, run_ws_session};

/// Frames above this multiple of `max_message_size` are cut off by the
/// transport instead of being answered with `PAYLOAD_TOO_LARGE`.
const TRANSPORT_FRAME_FACTOR: usize = 2;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registry, history and router.
    pub relay: Arc<Relay>,
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
    /// Open-socket cap.
    pub slots: Arc<ConnectionSlots>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The relay server.
pub struct RelayServer {
    config: Arc<ServerConfig>,
    relay: Arc<Relay>,
    slots: Arc<ConnectionSlots>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl RelayServer {
    /// Create a server with an empty registry and history.
    pub fn new(config: ServerConfig, verifier: Arc<dyn IdentityVerifier>) -> Self {
        let relay = Arc::new(Relay::new(
            verifier,
            config.max_message_size,
            config.max_body_bytes,
        ));
        Self {
            slots: Arc::new(ConnectionSlots::new(config.max_connections)),
            config: Arc::new(config),
            relay,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            relay: self.relay.clone(),
            config: self.config.clone(),
            slots: self.slots.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task,
    /// which finishes once shutdown is signalled and open sockets close.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(%addr, max_connections = self.config.max_connections, "relay listening");
        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "server stopped with error");
            }
        });
        Ok((addr, handle))
    }

    /// Shared relay state.
    pub fn relay(&self) -> &Arc<Relay> {
        &self.relay
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Open sockets right now.
    pub fn connection_count(&self) -> usize {
        self.slots.active()
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let online = state.relay.registry().online().await;
    Json(health::health_check(
        state.start_time,
        state.slots.active(),
        online,
        state.relay.history().len(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }
    let Some(slot) = state.slots.try_acquire() else {
        counter!(WS_CONNECTIONS_REFUSED_TOTAL).increment(1);
        warn!(max = state.slots.max(), "connection limit reached, refusing upgrade");
        return (StatusCode::SERVICE_UNAVAILABLE, "connection limit reached").into_response();
    };

    let connection_id = ConnectionId::new();
    let token = state.shutdown.token();
    ws.max_message_size(
        state
            .config
            .max_message_size
            .saturating_mul(TRANSPORT_FRAME_FACTOR),
    )
    .on_upgrade(move |socket| {
        run_ws_session(socket, connection_id, state.relay, state.config, token, slot)
    })
    .into_response()
}
