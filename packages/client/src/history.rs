//! Local history of received messages.

use std::sync::Arc;

use darkcomm_shared::{
    ChatMessage,
    time::{Clock, SystemClock},
};

/// A received message stamped with its local receive time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub message: ChatMessage,
    /// Unix timestamp in milliseconds
    pub received_at: i64,
}

/// Messages received during this session, oldest first. Not persisted.
pub struct MessageHistory {
    entries: Vec<HistoryEntry>,
    clock: Arc<dyn Clock>,
}

impl Default for MessageHistory {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Vec::new(),
            clock,
        }
    }

    /// Record `message` with the current time.
    pub fn record(&mut self, message: ChatMessage) -> &HistoryEntry {
        let received_at = self.clock.now_millis();
        self.entries.push(HistoryEntry {
            message,
            received_at,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }
}
