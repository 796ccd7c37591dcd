//! # tilesync Protocol
//!
//! Message shapes and CBOR codecs for tile sync.
//!
//! This crate provides:
//! - [`SyncMessage`] and its payload types
//! - [`UploadResultCode`], the closed set of upload outcomes
//! - The frame-size guard ([`MAX_FRAME_SIZE`]) and payload ceiling
//!   ([`HARD_MAX_PAYLOAD_SIZE`])
//!
//! This is a pure protocol crate with no I/O operations. Transport framing
//! and delivery belong to the host.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod messages;
mod result;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    batch_count, DownloadRequest, RegistryEntry, RegistryPage, SyncConfigMessage, SyncMessage,
    TileData, UploadRequest, UploadResult, HARD_MAX_PAYLOAD_SIZE, MAX_FRAME_SIZE,
};
pub use result::UploadResultCode;
