//! Conversions from remote field formats into local values.

use chrono::{DateTime, NaiveDateTime};

/// Map a fatigue level label or numeric string to a score.
///
/// `HIGH`, `MEDIUM`, and `LOW` map to 8, 5, and 2 regardless of case. Any
/// other finite number is taken as-is; everything else is 0.
pub fn fatigue_level_to_score(level: &str) -> f32 {
    let level = level.trim();
    if level.eq_ignore_ascii_case("HIGH") {
        return 8.0;
    }
    if level.eq_ignore_ascii_case("MEDIUM") {
        return 5.0;
    }
    if level.eq_ignore_ascii_case("LOW") {
        return 2.0;
    }

    level
        .parse::<f32>()
        .ok()
        .filter(|score| score.is_finite())
        .unwrap_or(0.0)
}

/// Parse an ISO-8601 timestamp into epoch milliseconds.
///
/// Accepts RFC 3339 with an offset, or a bare `YYYY-MM-DDTHH:MM:SS[.fff]`
/// which is read as UTC.
pub fn parse_iso_millis(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.timestamp_millis());
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}
