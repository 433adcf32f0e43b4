//! Managed software installs.
//!
//! Current collectors ship `installs.items`; older ones nested everything
//! under the client's name (`installs.cimian.items`, `installs.munki.items`).
//! Item statuses are mapped onto a small fixed set and the worst one becomes
//! the device's overall install status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::reconcile::lookup;
use crate::timestamp::parse_timestamp;
use crate::usage::{aggregate_records, UsageAggregate};

mod fields {
    use crate::reconcile::Field;

    pub const ITEMS: Field = Field::new(
        "items",
        &[
            "items",
            "managedInstalls",
            "managed_installs",
            "packages",
            "cimian.items",
            "munki.items",
            "cimian.managedInstalls",
            "munki.managedInstalls",
        ],
    );
    pub const SESSIONS: Field = Field::new(
        "sessions",
        &[
            "sessions",
            "installSessions",
            "install_sessions",
            "runs",
            "cimian.sessions",
            "munki.sessions",
        ],
    );
    pub const SESSION_KEY: Field = Field::new(
        "packageId",
        &["packageId", "package_id", "itemId", "item_id", "item", "package", "id", "name"],
    );

    pub const ID: Field = Field::new(
        "id",
        &["id", "itemId", "item_id", "packageId", "package_id", "name", "itemName"],
    );
    pub const NAME: Field = Field::new(
        "name",
        &["displayName", "display_name", "DisplayName", "name", "itemName", "item_name"],
    );
    pub const VERSION: Field = Field::new(
        "version",
        &["version", "latestVersion", "latest_version", "targetVersion", "target_version", "version_to_install"],
    );
    pub const INSTALLED_VERSION: Field = Field::new(
        "installedVersion",
        &["installedVersion", "installed_version", "currentVersion", "current_version"],
    );
    pub const STATUS: Field = Field::new(
        "status",
        &["status", "Status", "state", "currentStatus", "current_status", "installStatus", "result"],
    );
    pub const INSTALLED: Field = Field::new("installed", &["installed", "isInstalled", "is_installed"]);
    pub const LAST_ATTEMPT: Field = Field::new(
        "lastAttempt",
        &["lastAttempt", "last_attempt", "lastUpdate", "last_update", "lastInstallTime", "lastSeenInSession", "timestamp"],
    );
    pub const MESSAGE: Field = Field::new(
        "message",
        &["error", "lastError", "last_error", "errorMessage", "error_message", "message"],
    );

    pub const MANAGER: Field = Field::new("manager", &["manager", "client", "tool", "source"]);
    pub const CLIENT_VERSION: Field = Field::new(
        "clientVersion",
        &["clientVersion", "client_version", "version", "cimian.version", "munki.version"],
    );
    pub const LAST_RUN: Field = Field::new(
        "lastRun",
        &[
            "lastRun",
            "last_run",
            "lastCheck",
            "last_check",
            "lastSession.start",
            "cimian.lastRun",
            "munki.lastRun",
            "munki.last_run",
        ],
    );
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallStatus {
    Installed,
    Removed,
    #[default]
    Unknown,
    Pending,
    Warning,
    Error,
}

impl InstallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStatus::Installed => "installed",
            InstallStatus::Removed => "removed",
            InstallStatus::Unknown => "unknown",
            InstallStatus::Pending => "pending",
            InstallStatus::Warning => "warning",
            InstallStatus::Error => "error",
        }
    }

    /// Map a raw status string. Unrecognized strings are `Unknown`.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        let has = |needles: &[&str]| needles.iter().any(|n| s.contains(n));
        if has(&["error", "fail"]) {
            InstallStatus::Error
        } else if has(&["warn"]) {
            InstallStatus::Warning
        } else if has(&["not installed", "will be installed"]) {
            InstallStatus::Pending
        } else if has(&["removed", "uninstalled", "removal"]) {
            InstallStatus::Removed
        } else if has(&["pending", "available", "will be", "queued", "download", "installing", "scheduled"]) {
            InstallStatus::Pending
        } else if has(&["installed", "success", "current", "up to date"]) || s == "ok" {
            InstallStatus::Installed
        } else {
            InstallStatus::Unknown
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<String>,
    pub status: InstallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl InstallItem {
    fn from_value(record: &Value) -> Option<Self> {
        let id = fields::ID.string(record)?;
        let status = match fields::STATUS.string(record) {
            Some(raw) => InstallStatus::parse(&raw),
            None => match fields::INSTALLED.bool(record) {
                Some(true) => InstallStatus::Installed,
                Some(false) => InstallStatus::Pending,
                None => InstallStatus::Unknown,
            },
        };
        Some(Self {
            name: fields::NAME.string(record).unwrap_or_else(|| id.clone()),
            id,
            version: fields::VERSION.string(record),
            installed_version: fields::INSTALLED_VERSION.string(record),
            status,
            last_attempt: fields::LAST_ATTEMPT.find_map(record, parse_timestamp),
            message: fields::MESSAGE.string(record),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallCounts {
    pub total: usize,
    pub installed: usize,
    pub pending: usize,
    pub warning: usize,
    pub error: usize,
    pub removed: usize,
    pub unknown: usize,
}

impl InstallCounts {
    fn add(&mut self, status: InstallStatus) {
        self.total += 1;
        match status {
            InstallStatus::Installed => self.installed += 1,
            InstallStatus::Pending => self.pending += 1,
            InstallStatus::Warning => self.warning += 1,
            InstallStatus::Error => self.error += 1,
            InstallStatus::Removed => self.removed += 1,
            InstallStatus::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallsSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    /// Worst item status; absent when there are no items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_status: Option<InstallStatus>,
    pub counts: InstallCounts,
    #[serde(default)]
    pub items: Vec<InstallItem>,
    #[serde(default)]
    pub sessions: Vec<UsageAggregate>,
}

pub fn normalize_installs(module: Option<&Value>) -> InstallsSummary {
    let Some(installs) = module else {
        return InstallsSummary::default();
    };

    let records: Vec<&Value> = match installs {
        Value::Array(items) => items.iter().filter(|i| i.is_object()).collect(),
        _ => fields::ITEMS.records(installs),
    };
    let mut items: Vec<InstallItem> = records
        .iter()
        .filter_map(|r| InstallItem::from_value(r))
        .collect();
    items.sort_by(|a, b| {
        b.status
            .cmp(&a.status)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    let mut counts = InstallCounts::default();
    for item in &items {
        counts.add(item.status);
    }
    let overall_status = items.iter().map(|i| i.status).max();

    let sessions = match installs {
        Value::Object(_) => aggregate_records(&fields::SESSIONS.records(installs), &fields::SESSION_KEY),
        _ => Vec::new(),
    };

    let manager = fields::MANAGER.string(installs).or_else(|| legacy_manager(installs));
    debug!(items = items.len(), manager = ?manager, "normalized installs");

    InstallsSummary {
        manager,
        client_version: fields::CLIENT_VERSION.string(installs),
        last_run: fields::LAST_RUN.find_map(installs, parse_timestamp),
        overall_status,
        counts,
        items,
        sessions,
    }
}

fn legacy_manager(installs: &Value) -> Option<String> {
    [("cimian", "Cimian"), ("munki", "Munki")]
        .iter()
        .find(|(key, _)| lookup(installs, key).is_some_and(Value::is_object))
        .map(|(_, name)| name.to_string())
}
