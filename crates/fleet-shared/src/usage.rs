//! Usage/session aggregation.
//!
//! Folds discrete session records (application launches, install sessions)
//! into one rollup per entity key in a single pass. Start times are turned
//! into canonical ISO strings first; those are zero-padded UTC, so
//! first/last are found with plain string comparison.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

use crate::reconcile::{as_f64, Field};
use crate::timestamp::{parse_timestamp, to_iso};

mod fields {
    use crate::reconcile::Field;

    pub const NAME: Field = Field::new(
        "name",
        &["name", "appName", "app_name", "applicationName", "displayName", "processName", "process_name"],
    );
    pub const USER: Field = Field::new(
        "user",
        &["user", "userName", "username", "user_name", "UserName", "account", "owner"],
    );
    pub const START: Field = Field::new(
        "start",
        &["start", "startTime", "start_time", "StartTime", "launchTime", "launch_time", "timestamp", "time"],
    );
    pub const END: Field = Field::new(
        "end",
        &["end", "endTime", "end_time", "EndTime", "exitTime", "exit_time"],
    );
    pub const DURATION: Field = Field::new(
        "duration",
        &["durationSeconds", "duration_seconds", "duration", "Duration", "seconds", "usageSeconds", "usage_seconds"],
    );
}

/// One discrete session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageSession {
    pub key: String,
    pub name: Option<String>,
    pub user: Option<String>,
    /// Canonical ISO start time
    pub start: Option<String>,
    pub duration_seconds: u64,
}

impl UsageSession {
    /// Reconcile one raw record. `key` names the entity field for this kind
    /// of session (path for launches, package id for installs).
    pub fn from_value(record: &Value, key: &Field) -> Option<Self> {
        let key = key.string(record)?;
        let start = fields::START.find_map(record, parse_timestamp);
        let end = fields::END.find_map(record, parse_timestamp);

        let duration_seconds = match fields::DURATION.find_map(record, as_f64) {
            Some(secs) => secs.max(0.0).round() as u64,
            None => match (start, end) {
                (Some(start), Some(end)) if end > start => (end - start).num_seconds() as u64,
                _ => 0,
            },
        };

        Some(Self {
            key,
            name: fields::NAME.string(record),
            user: fields::USER.string(record),
            start: start.as_ref().map(to_iso),
            duration_seconds,
        })
    }
}

/// Per-entity rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAggregate {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub launch_count: u64,
    pub total_seconds: u64,
    pub average_session_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
    pub unique_user_count: usize,
    #[serde(default)]
    pub users: Vec<String>,
}

#[derive(Debug)]
struct Accumulator {
    key: String,
    name: Option<String>,
    launch_count: u64,
    total_seconds: u64,
    first_seen: Option<String>,
    last_used: Option<String>,
    users: BTreeSet<String>,
}

impl Accumulator {
    fn new(key: String) -> Self {
        Self {
            key,
            name: None,
            launch_count: 0,
            total_seconds: 0,
            first_seen: None,
            last_used: None,
            users: BTreeSet::new(),
        }
    }

    fn add(&mut self, session: UsageSession) {
        self.launch_count += 1;
        self.total_seconds = self.total_seconds.saturating_add(session.duration_seconds);
        if self.name.is_none() {
            self.name = session.name;
        }
        if let Some(user) = session.user {
            self.users.insert(user);
        }
        if let Some(start) = session.start {
            if self.first_seen.as_ref().map_or(true, |first| start < *first) {
                self.first_seen = Some(start.clone());
            }
            if self.last_used.as_ref().map_or(true, |last| start > *last) {
                self.last_used = Some(start);
            }
        }
    }

    fn finish(self) -> UsageAggregate {
        let average_session_seconds = if self.launch_count > 0 {
            self.total_seconds as f64 / self.launch_count as f64
        } else {
            0.0
        };
        UsageAggregate {
            key: self.key,
            name: self.name,
            launch_count: self.launch_count,
            total_seconds: self.total_seconds,
            average_session_seconds,
            first_seen: self.first_seen,
            last_used: self.last_used,
            unique_user_count: self.users.len(),
            users: self.users.into_iter().collect(),
        }
    }
}

/// Grouping key. Windows paths are case-insensitive.
pub fn grouping_key(key: &str) -> String {
    let trimmed = key.trim();
    let bytes = trimmed.as_bytes();
    let drive_letter = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if drive_letter || trimmed.contains('\\') {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Aggregate sessions in one pass. Output is ordered by total time, then
/// launch count (both descending), then key.
pub fn aggregate_sessions(sessions: impl IntoIterator<Item = UsageSession>) -> Vec<UsageAggregate> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut accumulators: Vec<Accumulator> = Vec::new();

    for session in sessions {
        let group = grouping_key(&session.key);
        let slot = match index.get(&group) {
            Some(&i) => i,
            None => {
                index.insert(group, accumulators.len());
                accumulators.push(Accumulator::new(session.key.clone()));
                accumulators.len() - 1
            }
        };
        accumulators[slot].add(session);
    }

    let mut out: Vec<UsageAggregate> = accumulators.into_iter().map(Accumulator::finish).collect();
    out.sort_by(|a, b| {
        b.total_seconds
            .cmp(&a.total_seconds)
            .then_with(|| b.launch_count.cmp(&a.launch_count))
            .then_with(|| a.key.cmp(&b.key))
    });
    out
}

/// Reconcile raw session records and aggregate them. Records without a key
/// are skipped.
pub fn aggregate_records(records: &[&Value], key: &Field) -> Vec<UsageAggregate> {
    aggregate_sessions(records.iter().filter_map(|r| UsageSession::from_value(r, key)))
}
