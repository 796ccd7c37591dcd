//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data that keeps the
//! identifier grammar and timestamp bounds.

use proptest::prelude::*;
use tilesync_core::{DimensionId, TileCoord, EPOCH_FLOOR_MS};
use tilesync_protocol::{RegistryEntry, UploadRequest};

/// Strategy for valid dimension identifiers, including nested paths.
pub fn dimension_strategy() -> impl Strategy<Value = DimensionId> {
    (
        "[a-z0-9_.-]{1,12}",
        "[a-z0-9_.-]{1,8}(/[a-z0-9_.-]{1,8}){0,2}",
    )
        .prop_map(|(ns, path)| DimensionId::new(ns, path).expect("grammar matches"))
}

/// Strategy for tile coordinates across the full integer range.
pub fn coord_strategy() -> impl Strategy<Value = TileCoord> {
    (dimension_strategy(), any::<i32>(), any::<i32>())
        .prop_map(|(dim, x, z)| TileCoord::new(dim, x, z))
}

/// Strategy for overworld coordinates near the origin, so collisions
/// between generated values are likely.
pub fn nearby_coord_strategy() -> impl Strategy<Value = TileCoord> {
    (-8i32..8, -8i32..8).prop_map(|(x, z)| crate::fixtures::tile(x, z))
}

/// Strategy for timestamps that pass validation.
pub fn valid_timestamp_strategy() -> impl Strategy<Value = i64> {
    EPOCH_FLOOR_MS..EPOCH_FLOOR_MS + 10 * 365 * 24 * 3_600_000
}

/// Strategy for tile payloads.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1024)
}

/// Strategy for registry entries.
pub fn registry_entry_strategy() -> impl Strategy<Value = RegistryEntry> {
    (coord_strategy(), valid_timestamp_strategy())
        .prop_map(|(coord, timestamp)| RegistryEntry::new(coord, timestamp))
}

/// Strategy for upload requests with valid timestamps.
pub fn upload_request_strategy() -> impl Strategy<Value = UploadRequest> {
    (coord_strategy(), valid_timestamp_strategy(), payload_strategy())
        .prop_map(|(coord, timestamp, payload)| UploadRequest::new(&coord, timestamp, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilesync_core::TimestampValidator;

    proptest! {
        #[test]
        fn generated_dimensions_parse_back(dim in dimension_strategy()) {
            prop_assert_eq!(DimensionId::parse(&dim.to_string()).unwrap(), dim);
        }

        #[test]
        fn generated_timestamps_are_valid(ts in valid_timestamp_strategy()) {
            prop_assert!(TimestampValidator::is_valid(ts));
            prop_assert_eq!(TimestampValidator::sanitize(ts), ts);
        }

        #[test]
        fn generated_uploads_name_their_coordinate(request in upload_request_strategy()) {
            let coord = request.coord().unwrap();
            prop_assert_eq!(coord.x, request.x);
            prop_assert_eq!(coord.dimension.to_string(), request.dimension);
        }
    }
}
