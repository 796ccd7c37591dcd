//! Server configuration.

use crate::error::{ServerError, ServerResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tilesync_core::DimensionId;
use tilesync_protocol::{SyncConfigMessage, HARD_MAX_PAYLOAD_SIZE};

/// Configuration for the sync server.
///
/// Serializes with dimensions as `namespace:path` strings, so a host can
/// keep it in a JSON file. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Whether uploads are accepted at all.
    pub sync_enabled: bool,
    /// Uploads per second per session.
    pub max_upload_per_sec: u32,
    /// Downloads per second per session.
    pub max_download_per_sec: u32,
    /// Minimum minutes between two uploads of one tile by one session.
    pub min_update_interval_minutes: u32,
    /// If non-empty, only these dimensions are synchronized.
    pub allowed_dimensions: Vec<DimensionId>,
    /// Never synchronized; overrides the allow-list.
    pub blacklisted_dimensions: Vec<DimensionId>,
    /// Largest accepted payload. Capped at [`HARD_MAX_PAYLOAD_SIZE`].
    pub max_payload_size: usize,
    /// Registry entries per page.
    pub registry_batch_size: usize,
    /// Registry pages sent per second per session.
    pub registry_pages_per_sec: u32,
    /// Bound on each session's download queue.
    pub max_pending_downloads: usize,
}

impl ServerConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            sync_enabled: true,
            max_upload_per_sec: 10,
            max_download_per_sec: 20,
            min_update_interval_minutes: 1,
            allowed_dimensions: Vec::new(),
            blacklisted_dimensions: Vec::new(),
            max_payload_size: HARD_MAX_PAYLOAD_SIZE,
            registry_batch_size: 500,
            registry_pages_per_sec: 20,
            max_pending_downloads: 4096,
        }
    }

    /// Enables or disables sync.
    pub fn with_sync_enabled(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    /// Sets the per-session upload rate.
    pub fn with_max_upload_per_sec(mut self, rate: u32) -> Self {
        self.max_upload_per_sec = rate;
        self
    }

    /// Sets the per-session download rate.
    pub fn with_max_download_per_sec(mut self, rate: u32) -> Self {
        self.max_download_per_sec = rate;
        self
    }

    /// Sets the minimum re-upload interval. Zero disables the check.
    pub fn with_min_update_interval_minutes(mut self, minutes: u32) -> Self {
        self.min_update_interval_minutes = minutes;
        self
    }

    /// Sets the allow-list.
    pub fn with_allowed_dimensions(mut self, dimensions: Vec<DimensionId>) -> Self {
        self.allowed_dimensions = dimensions;
        self
    }

    /// Sets the blacklist.
    pub fn with_blacklisted_dimensions(mut self, dimensions: Vec<DimensionId>) -> Self {
        self.blacklisted_dimensions = dimensions;
        self
    }

    /// Sets the payload limit.
    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    /// Sets the registry page size.
    pub fn with_registry_batch_size(mut self, size: usize) -> Self {
        self.registry_batch_size = size;
        self
    }

    /// Sets the registry paging rate.
    pub fn with_registry_pages_per_sec(mut self, rate: u32) -> Self {
        self.registry_pages_per_sec = rate;
        self
    }

    /// Sets the download queue bound.
    pub fn with_max_pending_downloads(mut self, max: usize) -> Self {
        self.max_pending_downloads = max;
        self
    }

    /// Payload limit actually enforced.
    pub fn effective_max_payload(&self) -> usize {
        self.max_payload_size.min(HARD_MAX_PAYLOAD_SIZE)
    }

    /// Minimum re-upload interval.
    pub fn min_update_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.min_update_interval_minutes) * 60)
    }

    /// Applies the allow/deny policy. The blacklist always wins.
    pub fn is_dimension_allowed(&self, dimension: &DimensionId) -> bool {
        if self.blacklisted_dimensions.contains(dimension) {
            return false;
        }
        self.allowed_dimensions.is_empty() || self.allowed_dimensions.contains(dimension)
    }

    /// Checks that every rate and size is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> ServerResult<()> {
        let checks = [
            ("max_upload_per_sec", self.max_upload_per_sec > 0),
            ("max_download_per_sec", self.max_download_per_sec > 0),
            ("registry_pages_per_sec", self.registry_pages_per_sec > 0),
            ("registry_batch_size", self.registry_batch_size > 0),
        ];
        match checks.iter().find(|(_, ok)| !ok) {
            Some((field, _)) => Err(ServerError::InvalidConfig(format!(
                "{field} must be greater than zero"
            ))),
            None => Ok(()),
        }
    }

    /// The subset pushed to clients.
    pub fn to_message(&self) -> SyncConfigMessage {
        SyncConfigMessage {
            sync_enabled: self.sync_enabled,
            max_upload_per_sec: self.max_upload_per_sec,
            max_download_per_sec: self.max_download_per_sec,
            min_update_interval_minutes: self.min_update_interval_minutes,
            allowed_dimensions: self.allowed_dimensions.clone(),
            blacklisted_dimensions: self.blacklisted_dimensions.clone(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
