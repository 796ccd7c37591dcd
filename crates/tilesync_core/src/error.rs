//! Error types for tilesync core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in tilesync core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O error while reading or writing a tile header.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A dimension identifier does not follow the `namespace:path` grammar.
    #[error("invalid dimension identifier: {value:?}")]
    InvalidDimension {
        /// The rejected identifier.
        value: String,
    },

    /// A tile header carries a format version this build cannot read.
    #[error("unsupported tile metadata version: {found} (supported: {supported})")]
    UnsupportedFormatVersion {
        /// Version found in the header.
        found: i32,
        /// The single supported version.
        supported: i32,
    },

    /// A rate limiter was configured with a non-positive rate.
    #[error("invalid rate: {rate} operations per second (must be positive)")]
    InvalidRate {
        /// The rejected rate.
        rate: i64,
    },
}

impl CoreError {
    /// Creates an invalid dimension error.
    pub fn invalid_dimension(value: impl Into<String>) -> Self {
        Self::InvalidDimension {
            value: value.into(),
        }
    }

    /// Returns true if this error indicates corrupt or incompatible stored data.
    pub fn is_corruption(&self) -> bool {
        match self {
            CoreError::UnsupportedFormatVersion { .. } => true,
            CoreError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
