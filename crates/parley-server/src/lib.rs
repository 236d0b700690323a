//! # parley-server
//!
//! Presence-aware message relay over WebSocket.
//!
//! - [`relay`]: connection registry, history log, message router, and the
//!   per-connection lifecycle state machine. Transport-agnostic.
//! - [`websocket`]: Axum `WebSocket` session driving one lifecycle per socket,
//!   with heartbeat and outbound forwarding
//! - [`server`]: HTTP routes (`/ws`, `/health`, `/metrics`) and listener
//! - [`auth`]: the credential check consulted before `identify` is honored
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod metrics;
pub mod relay;
pub mod server;
pub mod shutdown;
pub mod websocket;
