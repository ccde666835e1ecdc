//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur during framing or message handling.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("truncated frame: connection closed with {buffered} bytes pending")]
    TruncatedFrame { buffered: usize },

    #[error("invalid handshake: {0:?}")]
    InvalidHandshake(Vec<u8>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("binary encoding error: {0}")]
    Binary(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::FrameTooLarge {
            size: 100_000,
            max: 65_535,
        };
        assert!(err.to_string().contains("100000"));

        let err = ProtocolError::TruncatedFrame { buffered: 3 };
        assert!(err.to_string().contains("3 bytes"));

        let err = ProtocolError::InvalidHandshake(vec![b'9']);
        assert!(err.to_string().contains("handshake"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));

        let err = ProtocolError::MissingField("topic");
        assert!(err.to_string().contains("topic"));

        let err = ProtocolError::UnknownCommand("drop".to_string());
        assert!(err.to_string().contains("drop"));
    }
}
