//! Persisted tile records.

use tilesync_core::{CoreResult, TileMetadata, HEADER_SIZE};

/// A full stored tile: header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRecord {
    /// Contributor and timestamp.
    pub metadata: TileMetadata,
    /// Opaque tile bytes.
    pub payload: Vec<u8>,
}

impl TileRecord {
    /// Creates a record.
    pub fn new(metadata: TileMetadata, payload: Vec<u8>) -> Self {
        Self { metadata, payload }
    }

    /// Encodes the on-disk form: header followed by payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        buf.extend_from_slice(&self.metadata.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decodes the on-disk form.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let metadata = TileMetadata::decode(data)?;
        Ok(Self {
            metadata,
            payload: data[HEADER_SIZE..].to_vec(),
        })
    }

    /// Size of the encoded record.
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}
