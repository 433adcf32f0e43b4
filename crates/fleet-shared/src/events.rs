//! Device event feed normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::reconcile::json_kind;
use crate::timestamp::parse_timestamp;

mod fields {
    use crate::reconcile::Field;

    pub const LIST: Field = Field::new("events", &["events", "items", "data", "results"]);
    pub const ID: Field = Field::new("id", &["id", "eventId", "event_id", "uuid", "Id"]);
    pub const KIND: Field = Field::new(
        "kind",
        &["kind", "eventType", "event_type", "type", "level", "severity", "status"],
    );
    pub const MODULE: Field = Field::new(
        "module",
        &["module", "moduleId", "module_id", "source", "category"],
    );
    pub const MESSAGE: Field = Field::new(
        "message",
        &["message", "msg", "summary", "description", "details", "text"],
    );
    pub const TIMESTAMP: Field = Field::new(
        "timestamp",
        &["timestamp", "ts", "time", "createdAt", "created_at", "date", "eventTime"],
    );
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Success,
    Warning,
    Error,
    #[default]
    Info,
}

impl EventKind {
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_ascii_lowercase();
        if s.contains("error") || s.contains("fail") || s.contains("critical") || s.contains("fatal") {
            EventKind::Error
        } else if s.contains("warn") {
            EventKind::Warning
        } else if s.contains("success") || s == "ok" || s.contains("complete") {
            EventKind::Success
        } else {
            EventKind::Info
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl DeviceEvent {
    /// Entries without a usable timestamp cannot be placed and are skipped.
    pub fn from_value(record: &Value) -> Option<Self> {
        let timestamp = fields::TIMESTAMP.find_map(record, parse_timestamp)?;
        Some(Self {
            id: fields::ID.string(record),
            kind: fields::KIND
                .string(record)
                .map(|k| EventKind::parse(&k))
                .unwrap_or_default(),
            module: fields::MODULE.string(record),
            message: fields::MESSAGE.string(record),
            timestamp,
        })
    }
}

/// Newest first, at most `max` entries.
pub fn normalize_events(events: Option<&Value>, max: usize) -> Vec<DeviceEvent> {
    let records: Vec<&Value> = match events {
        None => return Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => fields::LIST.records(obj),
        Some(other) => {
            warn!(kind = json_kind(other), "events payload is not a list, ignoring");
            return Vec::new();
        }
    };

    let mut skipped = 0usize;
    let mut out: Vec<DeviceEvent> = records
        .into_iter()
        .filter_map(|record| {
            let event = record.is_object().then(|| DeviceEvent::from_value(record)).flatten();
            if event.is_none() {
                skipped += 1;
            }
            event
        })
        .collect();
    if skipped > 0 {
        warn!(skipped, "skipped malformed events");
    }

    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out.truncate(max);
    out
}
