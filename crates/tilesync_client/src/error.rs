//! Error types for the client engine.

use thiserror::Error;
use tilesync_core::CoreError;
use tilesync_protocol::ProtocolError;

/// Result type for client sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while synchronizing with a server.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// A message could not be encoded, decoded or validated.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server sent a message that only flows toward the server.
    #[error("unexpected {0} from server")]
    UnexpectedMessage(&'static str),

    /// A registry page arrived out of sequence.
    #[error("registry page {received} out of order, expected {expected}")]
    OutOfOrderPage {
        /// Index the engine expected next.
        expected: u32,
        /// Index actually received.
        received: u32,
    },

    /// Core error, such as an unusable advertised rate.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Not connected.
    #[error("not connected to server")]
    NotConnected,
}

impl SyncError {
    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    ///
    /// An out-of-order page is retryable by reconnecting, which restarts
    /// the registry transfer.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            SyncError::OutOfOrderPage { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        let lost = SyncError::Transport { message: "connection lost".into(), retryable: true };
        assert!(lost.is_retryable());
        assert!(!SyncError::transport_fatal("handshake refused").is_retryable());
        assert!(SyncError::NotConnected.is_retryable());
        assert!(SyncError::OutOfOrderPage { expected: 1, received: 3 }.is_retryable());
        assert!(!SyncError::UnexpectedMessage("UploadRequest").is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::NotConnected;
        assert_eq!(err.to_string(), "not connected to server");

        let err = SyncError::OutOfOrderPage { expected: 2, received: 5 };
        assert!(err.to_string().contains('2'));
        assert!(err.to_string().contains('5'));

        let err: SyncError = ProtocolError::invalid_structure("bad map").into();
        assert!(err.to_string().starts_with("protocol error"));
    }
}
