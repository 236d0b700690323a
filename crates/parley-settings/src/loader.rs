//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`ParleySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `PARLEY_*` environment variable overrides
//! 4. Validate the result

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{LogFormat, ParleySettings};

/// Resolve the path to the settings file (`~/.parley/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".parley").join("settings.json")
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid final
/// combination is an error.
pub fn load_settings_from_path(path: &Path) -> Result<ParleySettings> {
    let defaults = serde_json::to_value(ParleySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: ParleySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment overrides read through `lookup`.
///
/// Out-of-range or unparsable values are ignored with a warning.
pub fn apply_env_overrides<F>(settings: &mut ParleySettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.string("PARLEY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.parsed("PARLEY_PORT", 1_u16, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.parsed("PARLEY_MAX_CONNECTIONS", 1_usize, 100_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = env.parsed("PARLEY_HEARTBEAT_INTERVAL", 1_u64, 3600) {
        settings.server.heartbeat_interval_secs = v;
    }
    if let Some(v) = env.parsed("PARLEY_HEARTBEAT_TIMEOUT", 1_u64, 86_400) {
        settings.server.heartbeat_timeout_secs = v;
    }
    if let Some(v) = env.parsed("PARLEY_MAX_MESSAGE_SIZE", 1024_usize, 64 * 1024 * 1024) {
        settings.server.max_message_size = v;
    }
    if let Some(v) = env.parsed("PARLEY_MAX_BODY_BYTES", 1_usize, 64 * 1024 * 1024) {
        settings.server.max_body_bytes = v;
    }
    if let Some(v) = env.string("PARLEY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("PARLEY_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "PARLEY_LOG_FORMAT", value = %v, "invalid log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a number within an inclusive range.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" | "text" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn parsed<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: std::str::FromStr + PartialOrd,
    {
        let val = (self.lookup)(name)?;
        let result = parse_in_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}
