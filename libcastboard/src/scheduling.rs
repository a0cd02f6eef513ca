//! Parsing of schedule strings used by the authoring flow
//!
//! Accepted forms, tried in order:
//! - absolute timestamps: RFC 3339 (`2026-11-20T15:00:00Z`) or
//!   `YYYY-MM-DD HH:MM` interpreted as UTC
//! - relative durations: `30m`, `2h`, `+1d`
//! - natural language: `tomorrow`, `next monday 10am`

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::{CastboardError, Result};

/// Parse a schedule string relative to `now`
pub fn parse_schedule(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CastboardError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if let Some(at) = parse_absolute(input) {
        return Ok(at);
    }

    if let Some(duration) = parse_duration(input) {
        return Ok(now + duration);
    }

    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us).map_err(|e| {
        CastboardError::InvalidInput(format!("Could not parse schedule '{}': {}", input, e))
    })
}

/// Reject schedule times that are not strictly in the future
pub fn ensure_future(at: i64, now: i64) -> Result<()> {
    if at <= now {
        return Err(CastboardError::InvalidInput(format!(
            "Scheduled time {} must be in the future",
            format_timestamp(at)
        )));
    }
    Ok(())
}

/// Render a unix timestamp for humans (`2026-10-18 09:30:00 UTC`)
pub fn format_timestamp(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => ts.to_string(),
    }
}

fn parse_absolute(input: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_duration(input: &str) -> Option<chrono::Duration> {
    let input = input.strip_prefix('+').unwrap_or(input);
    let std_duration = humantime::parse_duration(input).ok()?;
    chrono::Duration::from_std(std_duration).ok()
}
