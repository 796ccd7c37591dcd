//! Tile metadata header.
//!
//! Every persisted tile starts with a fixed 28-byte header followed by the
//! opaque payload. All integers are big-endian.
//!
//! ```text
//! +---------+-----------------+-----------------+-------------+
//! | version | contributor hi  | contributor lo  | timestamp   |
//! | i32     | i64             | i64             | i64 (ms)    |
//! +---------+-----------------+-----------------+-------------+
//! ```

use crate::error::{CoreError, CoreResult};
use std::io::{Read, Write};
use uuid::Uuid;

/// Size of the encoded header in bytes.
pub const HEADER_SIZE: usize = 28;

/// The only header version this build reads or writes.
pub const FORMAT_VERSION: i32 = 1;

/// Who last contributed a tile, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileMetadata {
    /// Identity of the peer that produced the stored payload.
    pub contributor: Uuid,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl TileMetadata {
    /// Creates tile metadata.
    pub fn new(contributor: Uuid, timestamp: i64) -> Self {
        Self {
            contributor,
            timestamp,
        }
    }

    /// Encodes the header.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let bits = self.contributor.as_u128();
        let hi = (bits >> 64) as u64;
        let lo = bits as u64;

        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&FORMAT_VERSION.to_be_bytes());
        buf[4..12].copy_from_slice(&hi.to_be_bytes());
        buf[12..20].copy_from_slice(&lo.to_be_bytes());
        buf[20..28].copy_from_slice(&self.timestamp.to_be_bytes());
        buf
    }

    /// Decodes a header from the first [`HEADER_SIZE`] bytes of `data`.
    ///
    /// # Errors
    ///
    /// Returns an `UnexpectedEof` I/O error if `data` is too short, and
    /// [`CoreError::UnsupportedFormatVersion`] for any version other than
    /// [`FORMAT_VERSION`].
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let header: &[u8; HEADER_SIZE] = data
            .get(..HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| {
                CoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("tile header needs {HEADER_SIZE} bytes, got {}", data.len()),
                ))
            })?;

        let version = i32::from_be_bytes([header[0], header[1], header[2], header[3]]);
        if version != FORMAT_VERSION {
            return Err(CoreError::UnsupportedFormatVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }

        let hi = u64::from_be_bytes(read_8(header, 4));
        let lo = u64::from_be_bytes(read_8(header, 12));
        let timestamp = i64::from_be_bytes(read_8(header, 20));

        Ok(Self {
            contributor: Uuid::from_u128((u128::from(hi) << 64) | u128::from(lo)),
            timestamp,
        })
    }

    /// Writes the header to a stream.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> CoreResult<()> {
        writer.write_all(&self.encode())?;
        Ok(())
    }

    /// Reads exactly one header from a stream.
    pub fn read_from<R: Read>(reader: &mut R) -> CoreResult<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        reader.read_exact(&mut buf)?;
        Self::decode(&buf)
    }
}

fn read_8(header: &[u8; HEADER_SIZE], at: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&header[at..at + 8]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn layout_is_big_endian() {
        let contributor = Uuid::from_u128(0x0102_0304_0506_0708_090a_0b0c_0d0e_0f10);
        let meta = TileMetadata::new(contributor, 0x1122_3344_5566_7788);
        let bytes = meta.encode();

        assert_eq!(&bytes[0..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..12], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&bytes[12..20], &[9, 10, 11, 12, 13, 14, 15, 16]);
        assert_eq!(&bytes[20..28], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut bytes = TileMetadata::new(Uuid::nil(), 5).encode();
        bytes[3] = 2;

        let err = TileMetadata::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            CoreError::UnsupportedFormatVersion { found: 2, supported: 1 }
        ));
    }

    #[test]
    fn short_header_is_eof() {
        let err = TileMetadata::decode(&[0, 0, 0, 1, 0]).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn stream_read_leaves_payload() {
        let meta = TileMetadata::new(Uuid::new_v4(), 1_700_000_000_000);
        let mut data = Vec::new();
        meta.write_to(&mut data).unwrap();
        data.extend_from_slice(b"payload");

        let mut cursor = Cursor::new(data);
        let decoded = TileMetadata::read_from(&mut cursor).unwrap();
        assert_eq!(decoded, meta);

        let mut rest = Vec::new();
        cursor.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"payload");
    }

    proptest! {
        #[test]
        fn header_round_trip(bits in any::<u128>(), timestamp in any::<i64>()) {
            let meta = TileMetadata::new(Uuid::from_u128(bits), timestamp);
            prop_assert_eq!(TileMetadata::decode(&meta.encode()).unwrap(), meta);
        }
    }
}
