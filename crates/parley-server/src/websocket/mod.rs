//! WebSocket transport: one session task per socket, plus the connection cap.

pub mod session;
pub mod slots;

pub use session::run_ws_session;
pub use slots::{ConnectionSlots, SlotGuard};
