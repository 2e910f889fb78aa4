//! Date round-tripping for schema leaves tagged `format: "date"` or
//! `format: "date-time"`.
//!
//! State trees are plain `serde_json::Value`, so a date-format leaf is
//! always a JSON string on the wire; this module is the opaque
//! serialize/parse collaborator that decides whether such a string is
//! well-formed and normalizes it back to one on write.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

/// Parse a date-format leaf, accepting either an RFC 3339 date-time or a
/// bare `YYYY-MM-DD` calendar date.
pub fn try_parse(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

/// Render a timestamp the way a `SharedObject` state tree stores it:
/// millisecond-precision RFC 3339 with a literal `Z` offset.
pub fn format(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
