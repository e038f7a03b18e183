//! UUID v7 utilities for time-ordered identifiers.
//!
//! Every record id is a UUIDv7, so ids sort roughly by creation time. The
//! storage layer still keeps its own insertion sequence for exact ordering.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use termbase_core::uuid_utils::{is_v7, new_v7};
///
/// let id = new_v7();
/// assert!(is_v7(&id));
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Check whether a UUID is version 7.
pub fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}

/// Extract the embedded creation timestamp from a UUIDv7.
///
/// Returns `None` for any other UUID version.
pub fn extract_timestamp(id: &Uuid) -> Option<DateTime<Utc>> {
    if !is_v7(id) {
        return None;
    }
    let bytes = id.as_bytes();
    let millis = ((bytes[0] as u64) << 40)
        | ((bytes[1] as u64) << 32)
        | ((bytes[2] as u64) << 24)
        | ((bytes[3] as u64) << 16)
        | ((bytes[4] as u64) << 8)
        | (bytes[5] as u64);
    Utc.timestamp_millis_opt(millis as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_v7() {
        assert!(is_v7(&new_v7()));
    }

    #[test]
    fn test_v4_is_not_v7() {
        let id = Uuid::new_v4();
        assert!(!is_v7(&id));
        assert!(extract_timestamp(&id).is_none());
    }

    #[test]
    fn test_extract_timestamp_is_close_to_now() {
        let before = Utc::now().timestamp_millis();
        let id = new_v7();
        let after = Utc::now().timestamp_millis();

        let ts = extract_timestamp(&id).unwrap().timestamp_millis();
        assert!(ts >= before && ts <= after);
    }
}
