//! Configuration for the client engine.

use std::time::Duration;

/// Configuration for client-side synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Most upload requests produced by one planning round.
    pub max_uploads_per_round: usize,
    /// Coordinates per download request message.
    pub download_batch_size: usize,
    /// Most coordinates requested but not yet received.
    pub max_outstanding_downloads: usize,
    /// How long an upload may wait for its result before it is sent again.
    pub upload_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_uploads_per_round: 64,
            download_batch_size: 256,
            max_outstanding_downloads: 4096,
            upload_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the per-round upload bound.
    pub fn with_max_uploads_per_round(mut self, max: usize) -> Self {
        self.max_uploads_per_round = max;
        self
    }

    /// Sets the download request size.
    pub fn with_download_batch_size(mut self, size: usize) -> Self {
        self.download_batch_size = size;
        self
    }

    /// Sets the bound on outstanding downloads.
    pub fn with_max_outstanding_downloads(mut self, max: usize) -> Self {
        self.max_outstanding_downloads = max;
        self
    }

    /// Sets how long an upload may stay unanswered.
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
