//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] hubbub_protocol::ProtocolError),

    #[error("connection {0} is closed")]
    ConnectionClosed(u64),

    #[error("server shutting down")]
    ShuttingDown,
}
