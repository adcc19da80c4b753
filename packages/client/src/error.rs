//! Error types for the chat client.

use darkcomm_shared::{CodecError, MessageError};
use thiserror::Error;

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not reach the server
    #[error("Connection failed: {0}")]
    ConnectionError(String),

    /// Session is no longer connected
    #[error("Not connected to server")]
    NotConnected,

    /// Writing a record failed; the session is now disconnected
    #[error("Send failed: {0}")]
    SendFailed(#[from] CodecError),

    /// Username typed by the user is not acceptable
    #[error(transparent)]
    InvalidUsername(#[from] MessageError),

    /// Terminal input could not be read
    #[error("Input error: {0}")]
    Input(String),
}
