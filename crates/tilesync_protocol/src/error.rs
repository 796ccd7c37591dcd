//! Error types for protocol encoding and decoding.

use thiserror::Error;
use tilesync_core::CoreError;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while encoding or decoding a message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// CBOR serialization failed.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the failure.
        message: String,
    },

    /// The bytes are not valid CBOR.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the failure.
        message: String,
    },

    /// A frame exceeded the size guard.
    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// The CBOR is well-formed but not shaped like the expected message.
    #[error("invalid message structure: {message}")]
    InvalidStructure {
        /// Description of the problem.
        message: String,
    },

    /// The envelope names a message type this build does not know.
    #[error("unknown message type {0}")]
    UnknownMessageType(i128),

    /// Registry page counters contradict each other.
    #[error("inconsistent registry page: batch {batch_index} of {total_batches}, last = {is_last_batch}")]
    InvalidBatch {
        /// Index of the page.
        batch_index: u32,
        /// Declared number of pages.
        total_batches: u32,
        /// Declared last-page flag.
        is_last_batch: bool,
    },

    /// A field held an invalid identifier or value.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ProtocolError {
    /// Creates an invalid-structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates a missing-field error.
    pub fn missing_field(name: &str) -> Self {
        Self::invalid_structure(format!("missing or mistyped field `{name}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            ProtocolError::missing_field("x").to_string(),
            "invalid message structure: missing or mistyped field `x`"
        );
        assert_eq!(
            ProtocolError::FrameTooLarge { size: 10, max: 5 }.to_string(),
            "frame of 10 bytes exceeds limit of 5"
        );
    }
}
