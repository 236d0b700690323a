//! # parley-settings
//!
//! Configuration for the Parley relay, loaded from three layers (in priority
//! order):
//! 1. **Compiled defaults**: [`ParleySettings::default()`]
//! 2. **Settings file**: `~/.parley/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PARLEY_*` overrides (highest priority)
//!
//! Command-line flags in the `parley` binary are applied on top of the result.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings_from_path, settings_path};
pub use types::*;
