//! Installed applications and their usage.
//!
//! Windows reports most applications twice (32- and 64-bit uninstall hives),
//! so records are de-duplicated on case-insensitive name plus version, with
//! later records filling gaps in earlier ones. Launch sessions are
//! aggregated separately and joined back onto applications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::timestamp::parse_timestamp;
use crate::units::{bytes_from_kib_value, bytes_from_value};
use crate::usage::{aggregate_records, grouping_key, UsageAggregate};

mod fields {
    use crate::reconcile::Field;

    pub const LIST: Field = Field::new(
        "installedApplications",
        &[
            "installedApplications",
            "installed_applications",
            "InstalledApplications",
            "applications",
            "apps",
            "items",
            "software",
        ],
    );
    pub const NAME: Field = Field::new(
        "name",
        &["name", "Name", "displayName", "DisplayName", "display_name", "_name", "appName", "title"],
    );
    pub const VERSION: Field = Field::new(
        "version",
        &["version", "Version", "displayVersion", "DisplayVersion", "bundleVersion", "shortVersion", "CFBundleShortVersionString"],
    );
    pub const PUBLISHER: Field = Field::new(
        "publisher",
        &["publisher", "Publisher", "vendor", "developer", "obtained_from", "signedBy"],
    );
    pub const PATH: Field = Field::new(
        "path",
        &["path", "Path", "installLocation", "InstallLocation", "install_location", "location", "bundlePath"],
    );
    pub const BUNDLE_ID: Field = Field::new(
        "bundleId",
        &["bundleId", "bundle_id", "bundleIdentifier", "CFBundleIdentifier", "identifier", "packageId"],
    );
    pub const INSTALL_DATE: Field = Field::new(
        "installDate",
        &["installDate", "InstallDate", "install_date", "installedAt", "lastModified", "last_modified"],
    );
    pub const SIZE_BYTES: Field = Field::new(
        "sizeBytes",
        &["sizeBytes", "size_bytes", "size", "Size", "totalSize"],
    );
    pub const SIZE_KIB: Field = Field::new(
        "estimatedSize",
        &["EstimatedSize", "estimatedSize", "estimated_size"],
    );
    pub const ARCHITECTURE: Field = Field::new(
        "architecture",
        &["architecture", "arch", "Architecture", "kind"],
    );

    pub const SESSIONS: Field = Field::new(
        "usageSessions",
        &["usage.sessions", "usageSessions", "usage_sessions", "sessions", "launches", "usage"],
    );
    pub const SESSION_KEY: Field = Field::new(
        "path",
        &[
            "path",
            "exePath",
            "exe_path",
            "executablePath",
            "executable_path",
            "processPath",
            "bundleId",
            "bundle_id",
            "identifier",
        ],
    );
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledApplication {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageAggregate>,
}

impl InstalledApplication {
    fn from_value(record: &Value) -> Option<Self> {
        Some(Self {
            name: fields::NAME.string(record)?,
            version: fields::VERSION.string(record),
            publisher: fields::PUBLISHER.string(record),
            path: fields::PATH.string(record),
            bundle_id: fields::BUNDLE_ID.string(record),
            install_date: fields::INSTALL_DATE.find_map(record, parse_timestamp),
            size_bytes: fields::SIZE_BYTES
                .find_map(record, bytes_from_value)
                .or_else(|| fields::SIZE_KIB.find_map(record, bytes_from_kib_value)),
            architecture: fields::ARCHITECTURE.string(record),
            usage: None,
        })
    }

    fn dedupe_key(&self) -> (String, String) {
        (
            self.name.to_lowercase(),
            self.version.as_deref().unwrap_or_default().to_lowercase(),
        )
    }

    fn fill_from(&mut self, other: InstalledApplication) {
        self.publisher = self.publisher.take().or(other.publisher);
        self.path = self.path.take().or(other.path);
        self.bundle_id = self.bundle_id.take().or(other.bundle_id);
        self.install_date = self.install_date.or(other.install_date);
        self.size_bytes = self.size_bytes.or(other.size_bytes);
        self.architecture = self.architecture.take().or(other.architecture);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationsSummary {
    pub total_count: usize,
    #[serde(default)]
    pub applications: Vec<InstalledApplication>,
    /// Every usage rollup, including executables not matched to an application
    #[serde(default)]
    pub usage: Vec<UsageAggregate>,
}

pub fn normalize_applications(module: Option<&Value>) -> ApplicationsSummary {
    let Some(apps) = module else {
        return ApplicationsSummary::default();
    };

    let records: Vec<&Value> = match apps {
        Value::Array(items) => items.iter().filter(|i| i.is_object()).collect(),
        _ => fields::LIST.records(apps),
    };
    let mut applications = dedupe(records.iter().filter_map(|r| InstalledApplication::from_value(r)));

    let sessions: Vec<&Value> = match apps {
        Value::Object(_) => fields::SESSIONS.records(apps),
        _ => Vec::new(),
    };
    let usage = aggregate_records(&sessions, &fields::SESSION_KEY);
    join_usage(&mut applications, &usage);

    ApplicationsSummary {
        total_count: applications.len(),
        applications,
        usage,
    }
}

fn dedupe(apps: impl Iterator<Item = InstalledApplication>) -> Vec<InstalledApplication> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut out: Vec<InstalledApplication> = Vec::new();
    for app in apps {
        let key = app.dedupe_key();
        match index.get(&key) {
            Some(&i) => out[i].fill_from(app),
            None => {
                index.insert(key, out.len());
                out.push(app);
            }
        }
    }
    out.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.version.cmp(&b.version))
    });
    out
}

/// Attach usage to applications. An application matches an aggregate by
/// bundle id or path, then by executables under its install location, then
/// by name. Aggregates are ordered by total time, so the most used match wins.
fn join_usage(apps: &mut [InstalledApplication], usage: &[UsageAggregate]) {
    if usage.is_empty() {
        return;
    }
    let keys: Vec<String> = usage.iter().map(|u| grouping_key(&u.key)).collect();

    for app in apps.iter_mut() {
        let ids: Vec<String> = [app.bundle_id.as_deref(), app.path.as_deref()]
            .into_iter()
            .flatten()
            .map(grouping_key)
            .collect();

        let by_id = keys.iter().position(|k| ids.contains(k));
        let by_location = || {
            let location = app.path.as_deref().map(grouping_key)?;
            let location = location.trim_end_matches(is_separator).to_string();
            keys.iter().position(|k| {
                k.len() > location.len()
                    && k.starts_with(&location)
                    && k[location.len()..].starts_with(is_separator)
            })
        };
        let by_name = || {
            usage.iter().position(|u| {
                u.name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(&app.name))
            })
        };

        if let Some(i) = by_id.or_else(by_location).or_else(by_name) {
            app.usage = Some(usage[i].clone());
        }
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}
