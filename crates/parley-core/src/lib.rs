//! # parley-core
//!
//! Foundation types shared by every Parley crate:
//!
//! - **Branded IDs**: `ParticipantId`, `ConnectionId` as newtypes for type safety
//! - **Messages**: `ChatMessage` (a routed, sequenced message) and `MessageDraft`
//!   (the unvalidated `send_message` payload)
//! - **Errors**: `RelayError` via `thiserror`, with stable wire codes
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;

pub use errors::RelayError;
pub use ids::{ConnectionId, ParticipantId};
pub use messages::{ChatMessage, MessageDraft, ValidDraft};
