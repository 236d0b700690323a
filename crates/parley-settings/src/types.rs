//! Settings type definitions.
//!
//! Field names are camelCase on disk. Every struct is `#[serde(default)]`, so
//! a settings file only needs the keys it wants to change.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "server": { "port": 4000 },
///   "logging": { "level": "debug" },
///   "auth": { "tokens": { "alice": "s3cret" } }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParleySettings {
    /// Listener and connection limits.
    pub server: ServerSettings,
    /// Log level and output format.
    pub logging: LoggingSettings,
    /// Per-participant credentials.
    pub auth: AuthSettings,
}

impl ParleySettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let server = &self.server;
        if server.heartbeat_interval_secs == 0 {
            return Err(SettingsError::InvalidValue {
                key: "server.heartbeatIntervalSecs",
                reason: "must be at least 1".into(),
            });
        }
        if server.heartbeat_timeout_secs < server.heartbeat_interval_secs {
            return Err(SettingsError::InvalidValue {
                key: "server.heartbeatTimeoutSecs",
                reason: format!(
                    "{} is shorter than heartbeatIntervalSecs ({})",
                    server.heartbeat_timeout_secs, server.heartbeat_interval_secs
                ),
            });
        }
        if server.max_body_bytes > server.max_message_size {
            return Err(SettingsError::InvalidValue {
                key: "server.maxBodyBytes",
                reason: format!(
                    "{} exceeds maxMessageSize ({})",
                    server.max_body_bytes, server.max_message_size
                ),
            });
        }
        if server.send_buffer == 0 {
            return Err(SettingsError::InvalidValue {
                key: "server.sendBuffer",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Seconds between server pings.
    pub heartbeat_interval_secs: u64,
    /// Seconds without a pong before a connection is closed.
    pub heartbeat_timeout_secs: u64,
    /// Maximum inbound frame size in bytes.
    pub max_message_size: usize,
    /// Maximum serialized size of a message body in bytes.
    pub max_body_bytes: usize,
    /// Outbound queue depth per connection.
    pub send_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 500,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 64 * 1024,
            max_body_bytes: 16 * 1024,
            send_buffer: 256,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable single line.
    #[default]
    Compact,
    /// JSON lines.
    Json,
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Credentials checked before an `identify` is honored.
///
/// An empty map means every declared identity is accepted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// Participant identity to its token.
    pub tokens: BTreeMap<String, String>,
}
