//! Parsing helpers for datetime, duration and entry ids.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::errors::CliError;

/// Parse a datetime string (RFC 3339, `YYYY-MM-DD HH:MM[:SS]` or `YYYY-MM-DD`).
///
/// Values without an offset are taken as UTC.
pub fn parse_datetime(value: &str) -> anyhow::Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let naive = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| CliError::invalid_input(format!("Invalid date value: {}", value)))?;
        return Ok(naive.and_utc());
    }

    Err(CliError::invalid_input(format!(
        "Invalid date/time (expected ISO-8601 or YYYY-MM-DD): {}",
        value
    ))
    .into())
}

/// Parse a duration string (e.g., "7d", "24h").
pub fn parse_duration(value: &str) -> anyhow::Result<Duration> {
    if value.len() < 2 || !value.is_ascii() {
        return Err(CliError::invalid_input(format!(
            "Invalid duration: {} (expected <number><unit>)",
            value
        ))
        .into());
    }

    let (num_str, unit) = value.split_at(value.len() - 1);
    let amount: i64 = num_str
        .parse()
        .map_err(|_| CliError::invalid_input(format!("Invalid duration number: {}", value)))?;
    if amount <= 0 {
        return Err(CliError::invalid_input(format!("Duration must be positive: {}", value)).into());
    }

    let duration = match unit {
        "w" => Duration::try_weeks(amount),
        "d" => Duration::try_days(amount),
        "h" => Duration::try_hours(amount),
        "m" => Duration::try_minutes(amount),
        "s" => Duration::try_seconds(amount),
        _ => {
            return Err(CliError::invalid_input(format!(
                "Invalid duration unit: {} (use w/d/h/m/s)",
                unit
            ))
            .into())
        }
    };
    duration
        .ok_or_else(|| CliError::invalid_input(format!("Duration is too large: {}", value)).into())
}

/// The instant `duration` before `now`, or an input error when that falls off the calendar.
pub fn time_before(now: DateTime<Utc>, duration: Duration) -> anyhow::Result<DateTime<Utc>> {
    now.checked_sub_signed(duration).ok_or_else(|| {
        CliError::invalid_input("Duration reaches past the earliest supported date").into()
    })
}

pub fn parse_entry_id(value: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(value.trim()).map_err(|_| {
        CliError::invalid_input(format!(
            "Invalid entry ID: {}\nHint: Run `chronicle list` to see entry IDs.",
            value
        ))
        .into()
    })
}
