//! Event channel errors.

use thiserror::Error;

/// Result type alias for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Client is not connected to the server
    #[error("Not connected to server")]
    NotConnected,

    /// Connection attempt timed out
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Connection was lost during operation
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Frame could not be encoded
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
