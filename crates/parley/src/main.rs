//! # parley
//!
//! Relay binary: loads settings, installs logging and metrics, and serves
//! the WebSocket relay until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use parley_server::auth::{AllowAll, IdentityVerifier, StaticTokens};
use parley_server::config::ServerConfig;
use parley_server::server::RelayServer;
use parley_settings::{LogFormat, ParleySettings};

/// Parley message relay.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "Presence-aware WebSocket message relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.parley/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `parley_server=trace`.
    #[arg(long)]
    log_level: Option<String>,
}

fn server_config(settings: &ParleySettings, cli: &Cli) -> ServerConfig {
    let server = &settings.server;
    ServerConfig {
        host: cli.host.clone().unwrap_or_else(|| server.host.clone()),
        port: cli.port.unwrap_or(server.port),
        max_connections: server.max_connections,
        heartbeat_interval_secs: server.heartbeat_interval_secs,
        heartbeat_timeout_secs: server.heartbeat_timeout_secs,
        max_message_size: server.max_message_size,
        max_body_bytes: server.max_body_bytes,
        send_buffer: server.send_buffer,
    }
}

fn verifier(settings: &ParleySettings) -> Arc<dyn IdentityVerifier> {
    if settings.auth.tokens.is_empty() {
        Arc::new(AllowAll)
    } else {
        Arc::new(StaticTokens::new(settings.auth.tokens.clone()))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(parley_settings::settings_path);
    let settings = parley_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    match settings.logging.format {
        LogFormat::Compact => parley_core::logging::init_subscriber(level),
        LogFormat::Json => parley_core::logging::init_json_subscriber(level),
    }

    let config = server_config(&settings, &cli);
    let verifier = verifier(&settings);
    tracing::info!(
        path = %settings_path.display(),
        authenticated = !settings.auth.tokens.is_empty(),
        "settings loaded"
    );

    let metrics = parley_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;
    let server = RelayServer::new(config, verifier).with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("failed to bind listener")?;
    tracing::info!(%addr, "parley relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    server.shutdown().drain(vec![handle], None).await;
    tracing::info!("parley relay stopped");
    Ok(())
}
