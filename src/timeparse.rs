//! Event timestamp normalization
//!
//! Upstream producers are inconsistent about time encoding. A reading may
//! carry an ISO-8601 string, a bare epoch value in seconds or milliseconds
//! (as number or digit string), or a `YYYY-MM-DD HH:mm:ss[.SSS]` string
//! with no zone marker (treated as UTC). Everything normalizes to
//! `DateTime<Utc>` here so mappers never reimplement this.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Epoch values above this are interpreted as milliseconds.
const EPOCH_MS_THRESHOLD: f64 = 1e12;

/// Parse a JSON value into a UTC timestamp.
///
/// Accepted shapes:
/// - JSON number: epoch seconds, or epoch milliseconds when > 1e12
/// - 10-digit string: epoch seconds
/// - 13-digit string: epoch milliseconds
/// - `YYYY-MM-DD HH:mm:ss` (space- or T-separated) with optional
///   fractional seconds and no zone marker, assumed UTC
/// - any RFC 3339 / ISO-8601 string chrono can parse
///
/// Returns `None` for anything else (missing, null, garbage).
pub fn parse_event_time(input: &Value) -> Option<DateTime<Utc>> {
    match input {
        Value::Number(n) => {
            let v = n.as_f64()?;
            let ms = if v > EPOCH_MS_THRESHOLD { v } else { v * 1000.0 };
            Utc.timestamp_millis_opt(ms as i64).single()
        }
        Value::String(s) => parse_time_str(s),
        _ => None,
    }
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();

    if s.len() == 13 && s.bytes().all(|b| b.is_ascii_digit()) {
        let ms: i64 = s.parse().ok()?;
        return Utc.timestamp_millis_opt(ms).single();
    }
    if s.len() == 10 && s.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = s.parse().ok()?;
        return Utc.timestamp_opt(secs, 0).single();
    }

    // 'YYYY-MM-DD HH:mm:ss' with optional '.SSS', no zone marker -> UTC;
    // same for the T-separated form, which RFC 3339 alone would reject
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Resolve the `time`/`ts` field pair every inbound schema carries.
///
/// `time` wins when both are present. Returns `None` when neither parses.
pub fn resolve_time_fields(obj: &Value) -> Option<DateTime<Utc>> {
    obj.get("time")
        .and_then(parse_event_time)
        .or_else(|| obj.get("ts").and_then(parse_event_time))
}
