//! One WebSocket client from upgrade through disconnect.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::{counter, gauge, histogram};
use parley_core::ConnectionId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::slots::SlotGuard;
use crate::config::ServerConfig;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::relay::{ClientConnection, ConnectionLifecycle, Relay, ServerEvent};

/// Run a session for an upgraded socket.
///
/// 1. Queues `connection.established` with the connection ID
/// 2. Forwards queued events to the socket, pinging on the heartbeat interval
/// 3. Feeds inbound text frames to the connection's lifecycle
/// 4. On disconnect, heartbeat timeout or shutdown, closes the lifecycle
#[instrument(skip_all, fields(connection_id = %connection_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection_id: ConnectionId,
    relay: Arc<Relay>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
    slot: SlotGuard,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_buffer.max(1));
    let connection = Arc::new(ClientConnection::new(connection_id, send_tx));
    let mut lifecycle = ConnectionLifecycle::new(connection.clone(), relay);

    let started = Instant::now();
    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    if let Some(json) = ServerEvent::connection_established(&connection.id).to_json() {
        let _ = connection.send(json);
    }

    let outbound_conn = connection.clone();
    let interval = config.heartbeat_interval();
    let timeout = config.heartbeat_timeout();
    let outbound_shutdown = shutdown.clone();
    let mut outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(interval);
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    let silent = !outbound_conn.check_alive()
                        && outbound_conn.last_pong_elapsed() > timeout;
                    if silent {
                        warn!(
                            timeout_secs = timeout.as_secs(),
                            "client unresponsive, disconnecting"
                        );
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    }
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = outbound_shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            _ = &mut outbound => break,
            () = shutdown.cancelled() => break,
        };
        let Some(Ok(msg)) = frame else { break };
        connection.mark_alive();

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let _ = lifecycle.handle_frame(&text).await;
    }

    lifecycle.close().await;
    outbound.abort();

    info!(
        dropped = connection.drop_count(),
        duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "client disconnected"
    );
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    drop(slot);
}
