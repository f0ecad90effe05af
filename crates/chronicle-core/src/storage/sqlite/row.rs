//! Entry row type and timestamp encoding for database queries.

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::{ChronicleError, Result};
use crate::storage::types::Entry;

/// Column list matching `EntryRow::from_row`.
pub const ENTRY_COLUMNS: &str =
    "e.id, e.timestamp, e.message, e.hostname, e.username, e.working_directory, e.created_at";

/// Stored timestamp layout. Matches SQLite's `CURRENT_TIMESTAMP` prefix so
/// legacy rows and new rows sort together as plain text.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Encode a timestamp for storage (UTC, microsecond precision).
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Decode a stored timestamp.
///
/// Accepts the native layout, SQLite's `CURRENT_TIMESTAMP` output and
/// RFC 3339 (with `T` separator and offset).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(parsed.with_timezone(&Utc));
    }
    Err(ChronicleError::Storage(format!("Invalid timestamp: {}", raw)))
}

/// Raw row data from the entries table, before parsing into domain types.
#[derive(Debug)]
pub struct EntryRow {
    pub id: String,
    pub timestamp: String,
    pub message: String,
    pub hostname: String,
    pub username: String,
    pub working_directory: String,
    pub created_at: String,
}

impl EntryRow {
    /// Read a row selected with `ENTRY_COLUMNS`.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            message: row.get(2)?,
            hostname: row.get(3)?,
            username: row.get(4)?,
            working_directory: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl TryFrom<EntryRow> for Entry {
    type Error = ChronicleError;

    fn try_from(row: EntryRow) -> Result<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| ChronicleError::Storage(format!("Invalid entry UUID: {}", e)))?;
        let timestamp = parse_timestamp(&row.timestamp)?;
        let created_at = parse_timestamp(&row.created_at)?;

        Ok(Entry {
            id,
            timestamp,
            message: row.message,
            hostname: row.hostname,
            username: row.username,
            working_directory: row.working_directory,
            tags: Vec::new(),
            created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_round_trip_keeps_micros() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        let encoded = format_timestamp(&ts);
        assert_eq!(encoded, "2023-11-14 22:13:20.123456");
        assert_eq!(parse_timestamp(&encoded).unwrap(), ts);
    }

    #[test]
    fn test_parse_legacy_and_rfc3339() {
        let legacy = parse_timestamp("2024-01-02 03:04:05").unwrap();
        assert_eq!(legacy, Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());

        let rfc = parse_timestamp("2024-01-02T05:04:05+02:00").unwrap();
        assert_eq!(rfc, legacy);

        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_stored_layout_sorts_chronologically() {
        let earlier = format_timestamp(&Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        assert!("2024-01-02 03:04:04" < earlier.as_str());
        assert!(earlier.as_str() < "2024-01-02 03:04:06");
    }
}
