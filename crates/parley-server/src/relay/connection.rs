//! Connection handle: the push side of one live client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley_core::ConnectionId;
use tokio::sync::mpsc;

/// A connected client, as seen by the registry and router.
///
/// Owned by the session task; the registry only holds `Arc` clones and never
/// closes the channel itself. Dropping the last sender ends the outbound
/// writer.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// Whether the client has answered since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last Pong (or any activity) was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to full or closed channel.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Queue a serialized event for the client without waiting.
    ///
    /// Returns `false` if the channel is full or closed, and increments
    /// the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("dropped_messages", &self.drop_count())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::connection;
    use super::*;

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = connection("conn_1", 32);
        assert!(conn.send(Arc::new("hello".into())));
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[test]
    fn send_to_closed_channel_counts_drop() {
        let (conn, rx) = connection("conn_2", 32);
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_to_full_channel_counts_drop() {
        let (conn, _rx) = connection("conn_3", 1);
        assert!(conn.send(Arc::new("msg1".into())));
        assert!(!conn.send(Arc::new("msg2".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn check_alive_resets_flag() {
        let (conn, _rx) = connection("conn_4", 1);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn mark_alive_resets_pong_clock() {
        let (conn, _rx) = connection("conn_5", 1);
        std::thread::sleep(Duration::from_millis(20));
        assert!(conn.last_pong_elapsed() >= Duration::from_millis(20));
        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < Duration::from_millis(20));
    }
}
