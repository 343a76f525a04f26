//! Shared storage error taxonomy and timestamp conventions.
//!
//! Every table stores time as i64 unix seconds; the helpers here are the
//! single source of that convention. Pool construction lives with the
//! daemon's storage layer, which owns the schema.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{TimeZone, Utc};

/// Database errors surfaced by the daemon's storage modules.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal state transition: {0}")]
    IllegalTransition(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(e: sqlx::Error) -> Self {
        Self::Query(e.to_string())
    }
}

/// Current time in the storage convention: i64 unix seconds.
///
/// A clock before the epoch reads as 0 rather than going negative; claim
/// eligibility and event ordering both assume non-decreasing stamps.
pub fn unix_timestamp() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX),
        Err(_) => 0,
    }
}

/// Start of the UTC day containing `ts`, as a Unix timestamp.
///
/// The warming claim uses this as the day window boundary: an account is
/// eligible again once its `last_warmed_at` falls before the current day.
pub fn start_of_day(ts: i64) -> i64 {
    let dt = Utc.timestamp_opt(ts, 0).single().unwrap_or_default();
    let date = dt.date_naive();
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp())
        .unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_timestamp_is_reasonable() {
        let ts = unix_timestamp();
        // Should be after 2024-01-01
        assert!(ts > 1_704_067_200);
    }

    #[test]
    fn start_of_day_truncates_to_midnight() {
        // 2026-03-05T13:45:12Z
        let ts = 1_772_977_512;
        let day = start_of_day(ts);
        assert!(day <= ts);
        assert!(ts - day < 86_400);
        assert_eq!(day % 86_400, 0);
    }

    #[test]
    fn start_of_day_is_idempotent() {
        let ts = unix_timestamp();
        let day = start_of_day(ts);
        assert_eq!(start_of_day(day), day);
    }

    #[test]
    fn day_windows_partition_consecutive_stamps() {
        let base = 1_772_977_512;
        let same_day = base + 3_600;
        let next_day = base + 86_400;
        assert_eq!(start_of_day(base), start_of_day(same_day));
        assert_ne!(start_of_day(base), start_of_day(next_day));
    }
}
