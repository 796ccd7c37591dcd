//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tilesync_core::CoreError;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored tile header could not be decoded.
    #[error("corrupt tile at {path}: {source}")]
    Corrupted {
        /// File holding the bad header.
        path: PathBuf,
        /// The decoding failure.
        #[source]
        source: CoreError,
    },

    /// Another process holds the storage root.
    #[error("storage root {0} is locked by another process")]
    Locked(PathBuf),
}

impl StorageError {
    /// Returns true if the error is about data on disk rather than the disk itself.
    pub fn is_corruption(&self) -> bool {
        matches!(self, StorageError::Corrupted { .. })
    }
}
