//! Protocol messages for tile sync.
//!
//! Every frame is a CBOR map `{type, body}` where `type` is the message
//! type code and `body` is the message-specific map.

use crate::cbor::{
    array_field, as_map, bool_field, bytes_field, coord_field, dimension_list,
    dimension_list_field, from_bytes, get_field, int, int_field, key, push_coord, required,
    text_field, to_bytes, Pairs,
};
use crate::error::{ProtocolError, ProtocolResult};
use crate::result::UploadResultCode;
use ciborium::value::Value;
use tilesync_core::{DimensionId, TileCoord};

/// Largest tile payload any peer may send (1 MiB).
pub const HARD_MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Largest accepted frame: the payload ceiling plus room for the envelope.
pub const MAX_FRAME_SIZE: usize = HARD_MAX_PAYLOAD_SIZE + 64 * 1024;

/// Number of registry pages needed for `entries` entries.
///
/// An empty registry still takes one (empty, last) page so that the
/// client learns the transfer is complete.
pub fn batch_count(entries: usize, batch_size: usize) -> u32 {
    let batch_size = batch_size.max(1);
    let pages = entries.div_ceil(batch_size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Server settings pushed to every client on connect and on change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfigMessage {
    /// Whether the server accepts uploads at all.
    pub sync_enabled: bool,
    /// Upload budget per second per client.
    pub max_upload_per_sec: u32,
    /// Download budget per second per client.
    pub max_download_per_sec: u32,
    /// Minimum time between two uploads of the same tile by one client.
    pub min_update_interval_minutes: u32,
    /// If non-empty, only these dimensions are synchronized.
    pub allowed_dimensions: Vec<DimensionId>,
    /// Never synchronized, even if allowed.
    pub blacklisted_dimensions: Vec<DimensionId>,
}

impl SyncConfigMessage {
    /// Returns true if tiles of `dimension` are synchronized.
    ///
    /// The blacklist always wins; a non-empty allow-list must name the
    /// dimension.
    pub fn is_dimension_allowed(&self, dimension: &DimensionId) -> bool {
        if self.blacklisted_dimensions.contains(dimension) {
            return false;
        }
        self.allowed_dimensions.is_empty() || self.allowed_dimensions.contains(dimension)
    }

    fn to_value(&self) -> Value {
        Value::Map(vec![
            (key("sync_enabled"), Value::Bool(self.sync_enabled)),
            (key("max_upload_per_sec"), int(self.max_upload_per_sec)),
            (key("max_download_per_sec"), int(self.max_download_per_sec)),
            (
                key("min_update_interval_minutes"),
                int(self.min_update_interval_minutes),
            ),
            (
                key("allowed_dimensions"),
                dimension_list(&self.allowed_dimensions),
            ),
            (
                key("blacklisted_dimensions"),
                dimension_list(&self.blacklisted_dimensions),
            ),
        ])
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let map = as_map(value)?;
        Ok(Self {
            sync_enabled: bool_field(map, "sync_enabled")?,
            max_upload_per_sec: int_field(map, "max_upload_per_sec")?,
            max_download_per_sec: int_field(map, "max_download_per_sec")?,
            min_update_interval_minutes: int_field(map, "min_update_interval_minutes")?,
            allowed_dimensions: dimension_list_field(map, "allowed_dimensions")?,
            blacklisted_dimensions: dimension_list_field(map, "blacklisted_dimensions")?,
        })
    }
}

/// One `coordinate → timestamp` entry of the server registry.
///
/// Also used on its own as the update notice fanned out after an accepted
/// upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryEntry {
    /// Tile coordinate.
    pub coord: TileCoord,
    /// Timestamp the server holds.
    pub timestamp: i64,
}

impl RegistryEntry {
    /// Creates an entry.
    pub fn new(coord: TileCoord, timestamp: i64) -> Self {
        Self { coord, timestamp }
    }

    fn to_value(&self) -> Value {
        let mut pairs = Pairs::with_capacity(4);
        push_coord(&mut pairs, &self.coord);
        pairs.push((key("timestamp"), int(self.timestamp)));
        Value::Map(pairs)
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let map = as_map(value)?;
        Ok(Self {
            coord: coord_field(map)?,
            timestamp: int_field(map, "timestamp")?,
        })
    }
}

/// One page of the registry transfer that follows a connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPage {
    /// Entries of this page.
    pub entries: Vec<RegistryEntry>,
    /// Zero-based page index.
    pub batch_index: u32,
    /// Number of pages in the transfer.
    pub total_batches: u32,
    /// True on the final page.
    pub is_last_batch: bool,
}

impl RegistryPage {
    /// Creates a page, deriving the last-page flag from the counters.
    pub fn new(entries: Vec<RegistryEntry>, batch_index: u32, total_batches: u32) -> Self {
        Self {
            entries,
            batch_index,
            total_batches,
            is_last_batch: batch_index.saturating_add(1) == total_batches,
        }
    }

    /// Checks that the counters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidBatch`] if the index is out of range
    /// or the last-page flag disagrees with the counters.
    pub fn validate(&self) -> ProtocolResult<()> {
        let in_range = self.batch_index < self.total_batches;
        let last_matches =
            self.is_last_batch == (self.batch_index.saturating_add(1) == self.total_batches);
        if in_range && last_matches {
            Ok(())
        } else {
            Err(ProtocolError::InvalidBatch {
                batch_index: self.batch_index,
                total_batches: self.total_batches,
                is_last_batch: self.is_last_batch,
            })
        }
    }

    fn to_value(&self) -> Value {
        Value::Map(vec![
            (
                key("entries"),
                Value::Array(self.entries.iter().map(RegistryEntry::to_value).collect()),
            ),
            (key("is_last_batch"), Value::Bool(self.is_last_batch)),
            (key("batch_index"), int(self.batch_index)),
            (key("total_batches"), int(self.total_batches)),
        ])
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let map = as_map(value)?;
        let page = Self {
            entries: array_field(map, "entries")?
                .iter()
                .map(RegistryEntry::from_value)
                .collect::<ProtocolResult<_>>()?,
            batch_index: int_field(map, "batch_index")?,
            total_batches: int_field(map, "total_batches")?,
            is_last_batch: bool_field(map, "is_last_batch")?,
        };
        page.validate()?;
        Ok(page)
    }
}

/// A full tile sent from the server in answer to a download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileData {
    /// Tile coordinate.
    pub coord: TileCoord,
    /// Timestamp of the stored record.
    pub timestamp: i64,
    /// Opaque tile bytes.
    pub payload: Vec<u8>,
}

impl TileData {
    fn to_value(&self) -> Value {
        let mut pairs = Pairs::with_capacity(5);
        push_coord(&mut pairs, &self.coord);
        pairs.push((key("timestamp"), int(self.timestamp)));
        pairs.push((key("payload"), Value::Bytes(self.payload.clone())));
        Value::Map(pairs)
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let map = as_map(value)?;
        Ok(Self {
            coord: coord_field(map)?,
            timestamp: int_field(map, "timestamp")?,
            payload: bytes_field(map, "payload")?.to_vec(),
        })
    }
}

/// A tile offered by a client.
///
/// The dimension is kept as sent so the server can answer an unparsable
/// identifier with an upload result instead of dropping the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Dimension identifier as sent.
    pub dimension: String,
    /// Tile x.
    pub x: i32,
    /// Tile z.
    pub z: i32,
    /// Client-side timestamp of the tile.
    pub timestamp: i64,
    /// Opaque tile bytes.
    pub payload: Vec<u8>,
}

impl UploadRequest {
    /// Creates a request for `coord`.
    pub fn new(coord: &TileCoord, timestamp: i64, payload: Vec<u8>) -> Self {
        Self {
            dimension: coord.dimension.to_string(),
            x: coord.x,
            z: coord.z,
            timestamp,
            payload,
        }
    }

    /// Parses the target coordinate.
    ///
    /// # Errors
    ///
    /// Returns an error if the dimension is not a valid identifier.
    pub fn coord(&self) -> ProtocolResult<TileCoord> {
        let dimension = DimensionId::parse(&self.dimension)?;
        Ok(TileCoord::new(dimension, self.x, self.z))
    }

    fn to_value(&self) -> Value {
        Value::Map(vec![
            (key("dimension"), Value::Text(self.dimension.clone())),
            (key("x"), int(self.x)),
            (key("z"), int(self.z)),
            (key("timestamp"), int(self.timestamp)),
            (key("payload"), Value::Bytes(self.payload.clone())),
        ])
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let map = as_map(value)?;
        Ok(Self {
            dimension: text_field(map, "dimension")?.to_string(),
            x: int_field(map, "x")?,
            z: int_field(map, "z")?,
            timestamp: int_field(map, "timestamp")?,
            payload: bytes_field(map, "payload")?.to_vec(),
        })
    }
}

/// The server's answer to an [`UploadRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Dimension identifier echoed from the request.
    pub dimension: String,
    /// Tile x.
    pub x: i32,
    /// Tile z.
    pub z: i32,
    /// Outcome.
    pub code: UploadResultCode,
    /// Human-readable detail.
    pub message: String,
}

impl UploadResult {
    /// Creates a result for `request` with the code's default message.
    pub fn for_request(request: &UploadRequest, code: UploadResultCode) -> Self {
        Self {
            dimension: request.dimension.clone(),
            x: request.x,
            z: request.z,
            code,
            message: code.default_message().to_string(),
        }
    }

    /// Replaces the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Parses the coordinate the result refers to.
    pub fn coord(&self) -> Option<TileCoord> {
        DimensionId::parse(&self.dimension)
            .ok()
            .map(|d| TileCoord::new(d, self.x, self.z))
    }

    fn to_value(&self) -> Value {
        Value::Map(vec![
            (key("dimension"), Value::Text(self.dimension.clone())),
            (key("x"), int(self.x)),
            (key("z"), int(self.z)),
            (key("result"), int(self.code.code())),
            (key("message"), Value::Text(self.message.clone())),
        ])
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let map = as_map(value)?;
        let raw: u8 = int_field(map, "result")?;
        let code = UploadResultCode::from_code(raw)
            .ok_or_else(|| ProtocolError::invalid_structure(format!("unknown result code {raw}")))?;
        let message = get_field(map, "message")
            .and_then(Value::as_text)
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            dimension: text_field(map, "dimension")?.to_string(),
            x: int_field(map, "x")?,
            z: int_field(map, "z")?,
            code,
            message,
        })
    }
}

/// Tiles a client wants from the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DownloadRequest {
    /// Requested coordinates.
    pub coords: Vec<TileCoord>,
}

impl DownloadRequest {
    /// Creates a request.
    pub fn new(coords: Vec<TileCoord>) -> Self {
        Self { coords }
    }

    fn to_value(&self) -> Value {
        let entries = self
            .coords
            .iter()
            .map(|coord| {
                let mut pairs = Pairs::with_capacity(3);
                push_coord(&mut pairs, coord);
                Value::Map(pairs)
            })
            .collect();
        Value::Map(vec![(key("entries"), Value::Array(entries))])
    }

    fn from_value(value: &Value) -> ProtocolResult<Self> {
        let map = as_map(value)?;
        let coords = array_field(map, "entries")?
            .iter()
            .map(|entry| coord_field(as_map(entry)?))
            .collect::<ProtocolResult<_>>()?;
        Ok(Self { coords })
    }
}

/// A sync protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMessage {
    /// Server settings (server → client).
    Config(SyncConfigMessage),
    /// One registry page (server → client).
    RegistryPage(RegistryPage),
    /// A single accepted write by another peer (server → client).
    RegistryUpdate(RegistryEntry),
    /// A downloaded tile (server → client).
    TileData(TileData),
    /// A tile offered by the client (client → server).
    UploadRequest(UploadRequest),
    /// Outcome of an upload (server → client).
    UploadResult(UploadResult),
    /// Tiles the client wants (client → server).
    DownloadRequest(DownloadRequest),
}

impl SyncMessage {
    /// Returns the message type code.
    pub fn type_code(&self) -> u8 {
        match self {
            SyncMessage::Config(_) => 1,
            SyncMessage::RegistryPage(_) => 2,
            SyncMessage::RegistryUpdate(_) => 3,
            SyncMessage::TileData(_) => 4,
            SyncMessage::UploadRequest(_) => 5,
            SyncMessage::UploadResult(_) => 6,
            SyncMessage::DownloadRequest(_) => 7,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            SyncMessage::Config(_) => "config",
            SyncMessage::RegistryPage(_) => "registry_page",
            SyncMessage::RegistryUpdate(_) => "registry_update",
            SyncMessage::TileData(_) => "tile_data",
            SyncMessage::UploadRequest(_) => "upload_request",
            SyncMessage::UploadResult(_) => "upload_result",
            SyncMessage::DownloadRequest(_) => "download_request",
        }
    }

    /// Encodes to a CBOR frame.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] if the frame would exceed
    /// [`MAX_FRAME_SIZE`].
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let body = match self {
            SyncMessage::Config(m) => m.to_value(),
            SyncMessage::RegistryPage(m) => m.to_value(),
            SyncMessage::RegistryUpdate(m) => m.to_value(),
            SyncMessage::TileData(m) => m.to_value(),
            SyncMessage::UploadRequest(m) => m.to_value(),
            SyncMessage::UploadResult(m) => m.to_value(),
            SyncMessage::DownloadRequest(m) => m.to_value(),
        };
        let envelope = Value::Map(vec![
            (key("type"), int(self.type_code())),
            (key("body"), body),
        ]);

        let bytes = to_bytes(&envelope)?;
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(bytes)
    }

    /// Decodes a CBOR frame.
    ///
    /// Oversized frames are rejected before any parsing.
    ///
    /// # Errors
    ///
    /// Returns an error for oversized, malformed or unknown frames and for
    /// registry pages with inconsistent counters.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: bytes.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let envelope = from_bytes(bytes)?;
        let map = as_map(&envelope)?;
        let type_code = required(map, "type")?
            .as_integer()
            .map(i128::from)
            .ok_or_else(|| ProtocolError::missing_field("type"))?;
        let body = required(map, "body")?;

        match type_code {
            1 => Ok(SyncMessage::Config(SyncConfigMessage::from_value(body)?)),
            2 => Ok(SyncMessage::RegistryPage(RegistryPage::from_value(body)?)),
            3 => Ok(SyncMessage::RegistryUpdate(RegistryEntry::from_value(body)?)),
            4 => Ok(SyncMessage::TileData(TileData::from_value(body)?)),
            5 => Ok(SyncMessage::UploadRequest(UploadRequest::from_value(body)?)),
            6 => Ok(SyncMessage::UploadResult(UploadResult::from_value(body)?)),
            7 => Ok(SyncMessage::DownloadRequest(DownloadRequest::from_value(body)?)),
            other => Err(ProtocolError::UnknownMessageType(other)),
        }
    }
}
