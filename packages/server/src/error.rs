//! Error types for the chat server.

use thiserror::Error;

/// Server-level errors. Errors local to one connection never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Listener could not be bound
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected before binding
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Listener I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
