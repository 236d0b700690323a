//! Structured logging with `tracing`.
//!
//! All crates log through `tracing` macros with structured fields
//! (`connection_id`, `identity`, `seq`). The binary installs the subscriber
//! once at startup via [`init_subscriber`].

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber with compact stderr output.
///
/// `RUST_LOG` takes precedence over `level` when set. Subsequent calls are
/// no-ops.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}

/// Initialize the global tracing subscriber with JSON lines on stderr.
pub fn init_json_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .json();

    let _ = subscriber.try_init();
}
