//! Append-only conversation history.

use parking_lot::RwLock;
use parley_core::{ChatMessage, ValidDraft};

use super::protocol::now_timestamp;

/// Every routed message, in arrival order, for the life of the process.
///
/// Sequence assignment and the push happen under one write lock, so `seq`
/// order always equals storage order and readers never see a partial append.
pub struct HistoryLog {
    entries: RwLock<Vec<ChatMessage>>,
}

impl HistoryLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append a validated message and return it as stored.
    pub fn append(&self, draft: ValidDraft) -> ChatMessage {
        let mut entries = self.entries.write();
        let message = ChatMessage {
            seq: entries.len() as u64 + 1,
            from: draft.from,
            to: draft.to,
            body: draft.body,
            sent_at: now_timestamp(),
        };
        entries.push(message.clone());
        message
    }

    /// All messages exchanged between `a` and `b` (either direction), oldest
    /// first.
    pub fn query(&self, a: &str, b: &str) -> Vec<ChatMessage> {
        self.entries
            .read()
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect()
    }

    /// Total number of stored messages.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been routed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}
