//! Shared server state handed to every connection task.

use std::sync::Arc;

use darkcomm_shared::ChatCodec;

use crate::{broadcast::Broadcaster, registry::ConnectionRegistry};

/// Shared application state
pub struct AppState {
    /// Open connections
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out over `registry`
    pub broadcaster: Broadcaster,
    /// Per-line limit applied to every connection's decoder
    pub max_line_bytes: Option<usize>,
}

impl AppState {
    pub fn new(max_line_bytes: Option<usize>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            broadcaster: Broadcaster::new(registry.clone()),
            registry,
            max_line_bytes,
        }
    }

    /// Decoder for a newly accepted connection.
    pub fn codec(&self) -> ChatCodec {
        match self.max_line_bytes {
            Some(limit) => ChatCodec::with_max_line_bytes(limit),
            None => ChatCodec::new(),
        }
    }
}
