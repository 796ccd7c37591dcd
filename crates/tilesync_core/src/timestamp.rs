//! Timestamp bounds checking.
//!
//! Last-write-wins compares raw millisecond timestamps supplied by peers, so
//! a skewed or hostile clock could otherwise claim permanent priority.

use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum accepted clock drift into the future (5 minutes).
pub const MAX_FUTURE_DRIFT_MS: i64 = 5 * 60 * 1000;

/// Earliest plausible timestamp (2011-11-18T00:00:00Z).
pub const EPOCH_FLOOR_MS: i64 = 1_321_574_400_000;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Validates and clamps peer-supplied timestamps.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampValidator;

impl TimestampValidator {
    /// Returns true if `timestamp` is neither beyond the drift window nor
    /// before [`EPOCH_FLOOR_MS`].
    pub fn is_valid(timestamp: i64) -> bool {
        Self::is_valid_at(timestamp, now_millis())
    }

    /// [`TimestampValidator::is_valid`] against an explicit clock reading.
    pub fn is_valid_at(timestamp: i64, now: i64) -> bool {
        timestamp <= now.saturating_add(MAX_FUTURE_DRIFT_MS) && timestamp >= EPOCH_FLOOR_MS
    }

    /// Clamps future timestamps down to now and ancient ones up to the floor.
    pub fn sanitize(timestamp: i64) -> i64 {
        Self::sanitize_at(timestamp, now_millis())
    }

    /// [`TimestampValidator::sanitize`] against an explicit clock reading.
    pub fn sanitize_at(timestamp: i64, now: i64) -> i64 {
        if timestamp > now {
            now
        } else if timestamp < EPOCH_FLOOR_MS {
            EPOCH_FLOOR_MS
        } else {
            timestamp
        }
    }
}
