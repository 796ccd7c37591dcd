//! Upload result codes.

use std::fmt;

/// Outcome of an upload request.
///
/// Rejections are ordinary protocol outcomes, not errors. The numeric
/// code is the wire representation and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadResultCode {
    /// Stored and broadcast.
    Accepted,
    /// The server holds a record at least as new.
    RejectedOutdated,
    /// This session uploaded the same tile too recently.
    RejectedTooSoon,
    /// The dimension is not synchronized.
    RejectedDimensionNotAllowed,
    /// The payload exceeds the size limit.
    RejectedDataTooLarge,
    /// The session's upload budget is exhausted.
    RejectedRateLimited,
    /// Synchronization is disabled on the server.
    RejectedSyncDisabled,
    /// The request carried an invalid timestamp or identifier.
    RejectedInvalidData,
    /// The server failed to persist the tile.
    RejectedError,
}

impl UploadResultCode {
    /// All codes in wire order.
    pub const ALL: [UploadResultCode; 9] = [
        UploadResultCode::Accepted,
        UploadResultCode::RejectedOutdated,
        UploadResultCode::RejectedTooSoon,
        UploadResultCode::RejectedDimensionNotAllowed,
        UploadResultCode::RejectedDataTooLarge,
        UploadResultCode::RejectedRateLimited,
        UploadResultCode::RejectedSyncDisabled,
        UploadResultCode::RejectedInvalidData,
        UploadResultCode::RejectedError,
    ];

    /// Returns the wire code.
    pub fn code(self) -> u8 {
        match self {
            UploadResultCode::Accepted => 0,
            UploadResultCode::RejectedOutdated => 1,
            UploadResultCode::RejectedTooSoon => 2,
            UploadResultCode::RejectedDimensionNotAllowed => 3,
            UploadResultCode::RejectedDataTooLarge => 4,
            UploadResultCode::RejectedRateLimited => 5,
            UploadResultCode::RejectedSyncDisabled => 6,
            UploadResultCode::RejectedInvalidData => 7,
            UploadResultCode::RejectedError => 8,
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Returns true for [`UploadResultCode::Accepted`].
    pub fn is_accepted(self) -> bool {
        self == UploadResultCode::Accepted
    }

    /// Returns true if the same upload may succeed later without changes.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            UploadResultCode::RejectedTooSoon
                | UploadResultCode::RejectedRateLimited
                | UploadResultCode::RejectedError
        )
    }

    /// Canonical upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            UploadResultCode::Accepted => "ACCEPTED",
            UploadResultCode::RejectedOutdated => "REJECTED_OUTDATED",
            UploadResultCode::RejectedTooSoon => "REJECTED_TOO_SOON",
            UploadResultCode::RejectedDimensionNotAllowed => "REJECTED_DIMENSION_NOT_ALLOWED",
            UploadResultCode::RejectedDataTooLarge => "REJECTED_DATA_TOO_LARGE",
            UploadResultCode::RejectedRateLimited => "REJECTED_RATE_LIMITED",
            UploadResultCode::RejectedSyncDisabled => "REJECTED_SYNC_DISABLED",
            UploadResultCode::RejectedInvalidData => "REJECTED_INVALID_DATA",
            UploadResultCode::RejectedError => "REJECTED_ERROR",
        }
    }

    /// Default human-readable message.
    pub fn default_message(self) -> &'static str {
        match self {
            UploadResultCode::Accepted => "Chunk accepted",
            UploadResultCode::RejectedOutdated => "Server has newer data",
            UploadResultCode::RejectedTooSoon => "Too soon since last update",
            UploadResultCode::RejectedDimensionNotAllowed => "Dimension not allowed",
            UploadResultCode::RejectedDataTooLarge => "Data too large",
            UploadResultCode::RejectedRateLimited => "Rate limited",
            UploadResultCode::RejectedSyncDisabled => "Sync is disabled",
            UploadResultCode::RejectedInvalidData => "Invalid data",
            UploadResultCode::RejectedError => "Server error",
        }
    }
}

impl fmt::Display for UploadResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_are_ordinal() {
        for (i, code) in UploadResultCode::ALL.iter().enumerate() {
            assert_eq!(usize::from(code.code()), i);
            assert_eq!(UploadResultCode::from_code(code.code()), Some(*code));
        }
        assert_eq!(UploadResultCode::from_code(9), None);
    }

    #[test]
    fn only_accepted_is_accepted() {
        let accepted: Vec<_> = UploadResultCode::ALL
            .iter()
            .filter(|c| c.is_accepted())
            .collect();
        assert_eq!(accepted, vec![&UploadResultCode::Accepted]);
    }

    #[test]
    fn display_uses_wire_name() {
        assert_eq!(
            UploadResultCode::RejectedTooSoon.to_string(),
            "REJECTED_TOO_SOON"
        );
    }
}
