//! Timestamp parsing and relative labels.
//!
//! Collectors send RFC 3339 strings, naive local-looking strings, epoch
//! seconds, epoch milliseconds, `yyyymmdd` registry dates and the
//! `/Date(1700000000000)/` form used by Windows JSON serializers. All of them
//! become `DateTime<Utc>`; naive values are taken as UTC.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

/// Epoch values above this are milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e12;

/// Last year `to_iso` renders with four digits.
const MAX_YEAR: i32 = 9999;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%d %H:%M:%S%.f %z"];

/// Parse any supported raw timestamp representation.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(inner) = s.strip_prefix("/Date(").and_then(|r| r.strip_suffix(")/")) {
        // "/Date(1700000000000+0100)/": the offset is informational, millis are UTC.
        let millis: String = inner
            .chars()
            .enumerate()
            .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && *c == '-'))
            .map(|(_, c)| c)
            .collect();
        return millis
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .filter(within_iso_range);
    }

    if s.len() == 8 && s.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y%m%d") {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }

    if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return s.parse::<f64>().ok().and_then(from_epoch);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn within_iso_range(ts: &DateTime<Utc>) -> bool {
    ts.year() <= MAX_YEAR
}

/// Epoch seconds or milliseconds. Zero, negative and post-9999 values are junk.
pub fn from_epoch(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let millis = if value > EPOCH_MILLIS_THRESHOLD {
        value
    } else {
        value * 1000.0
    };
    Utc.timestamp_millis_opt(millis.round() as i64)
        .single()
        .filter(within_iso_range)
}

/// Canonical string form: RFC 3339, UTC, whole seconds.
///
/// Zero-padded and fixed-width, so lexical order equals chronological order.
pub fn to_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Seam for the presentation layer's relative time labels ("5m ago").
pub trait RelativeTimeFormatter: Send + Sync {
    fn format(&self, then: DateTime<Utc>, now: DateTime<Utc>) -> String;
}

/// Default compact labels: "just now", "12m ago", "3h ago", "5d ago", then a date.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactRelativeTime;

impl RelativeTimeFormatter for CompactRelativeTime {
    fn format(&self, then: DateTime<Utc>, now: DateTime<Utc>) -> String {
        let secs = (now - then).num_seconds();
        match secs {
            s if s < 60 => "just now".to_string(),
            s if s < 3_600 => format!("{}m ago", s / 60),
            s if s < 86_400 => format!("{}h ago", s / 3_600),
            s if s < 30 * 86_400 => format!("{}d ago", s / 86_400),
            _ => then.format("%Y-%m-%d").to_string(),
        }
    }
}
