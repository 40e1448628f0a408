//! Wall-clock helpers. Records carry RFC3339 strings so that persisted entities stay
//! human-readable and diff-friendly; deadlines use [`std::time::Instant`] instead.

use std::time::{SystemTime, UNIX_EPOCH};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

/// The current UTC time formatted as RFC3339
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

/// Seconds since the unix epoch
pub fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// A compact `YYYYMMDDHHMMSS` stamp, used for backup directory names
pub fn compact_timestamp() -> String {
    let format = format_description!("[year][month][day][hour][minute][second]");
    OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| unix_seconds().to_string())
}
