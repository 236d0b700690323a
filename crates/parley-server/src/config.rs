//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Runtime configuration for [`crate::server::RelayServer`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Close a connection after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Max inbound WebSocket frame size in bytes.
    pub max_message_size: usize,
    /// Max serialized message body size in bytes.
    pub max_body_bytes: usize,
    /// Outbound queue depth per connection.
    pub send_buffer: usize,
}

impl ServerConfig {
    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    /// Pong timeout as a `Duration`.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 500,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            max_body_bytes: 16 * 1024,
            send_buffer: 256,
        }
    }
}
