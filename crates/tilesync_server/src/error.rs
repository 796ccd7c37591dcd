//! Error types for the sync server.

use thiserror::Error;
use tilesync_core::CoreError;
use tilesync_protocol::ProtocolError;
use tilesync_storage::StorageError;
use uuid::Uuid;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the sync server.
///
/// Upload rejections are not errors; they are reported as
/// [`tilesync_protocol::UploadResultCode`] values.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A message the server does not accept from clients.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No session exists for the player.
    #[error("no session for player {0}")]
    UnknownSession(Uuid),

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Frame could not be decoded or encoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Model-level failure.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ServerError {
    /// Returns true if the peer or caller is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::UnknownSession(_)
                | ServerError::InvalidConfig(_)
                | ServerError::Protocol(_)
        )
    }

    /// Returns true if the server itself failed.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Storage(_) | ServerError::Core(_))
    }
}
