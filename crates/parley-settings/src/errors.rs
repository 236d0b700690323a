//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or checking relay settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {}: {source}", .path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("settings file {} is not valid JSON: {source}", .path.display())]
    Parse {
        /// File that was being parsed.
        path: PathBuf,
        /// Parser diagnostic.
        #[source]
        source: serde_json::Error,
    },
    /// The merged settings do not fit the settings types (wrong field type).
    #[error("settings do not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A value the relay cannot run with.
    #[error("invalid setting `{key}`: {reason}")]
    InvalidValue {
        /// camelCase path of the offending key, e.g. `server.sendBuffer`.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
