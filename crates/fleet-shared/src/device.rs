//! Canonical device model and status derivation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::applications::ApplicationsSummary;
use crate::config::StatusThresholds;
use crate::events::DeviceEvent;
use crate::hardware::HardwareInfo;
use crate::installs::InstallsSummary;
use crate::network::NetworkSummary;
use crate::profiles::ProfilesSummary;
use crate::security::SecurityInfo;
use crate::system::{Platform, SystemInfo};

/// Fleet-level device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Stale,
    Warning,
    Error,
    Missing,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Stale => "stale",
            DeviceStatus::Warning => "warning",
            DeviceStatus::Error => "error",
            DeviceStatus::Missing => "missing",
        }
    }

    /// Parse an upstream status. Only the five canonical names are accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(DeviceStatus::Active),
            "stale" => Some(DeviceStatus::Stale),
            "warning" => Some(DeviceStatus::Warning),
            "error" => Some(DeviceStatus::Error),
            "missing" => Some(DeviceStatus::Missing),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status from last-seen age.
///
/// Age below the active window is active, below the stale window stale,
/// otherwise missing. Both bounds are exclusive: exactly 24h is stale.
/// Timestamps in the future count as age zero; no timestamp at all is missing.
pub fn derive_status(
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    thresholds: &StatusThresholds,
) -> DeviceStatus {
    let Some(seen) = last_seen else {
        return DeviceStatus::Missing;
    };
    let age = (now - seen).max(chrono::Duration::zero());
    if age < thresholds.effective_active_window() {
        DeviceStatus::Active
    } else if age < thresholds.effective_stale_window() {
        DeviceStatus::Stale
    } else {
        DeviceStatus::Missing
    }
}

/// The engine's output. `device_id`, `serial_number` and `last_seen` are
/// always set; every sub-object is present even when its module was not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDevice {
    pub device_id: String,
    pub serial_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub platform: Platform,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
    /// Relative label for `last_seen`, e.g. "3h ago"
    pub last_seen_label: String,
    /// `last_seen` was missing or unparseable and holds the processing time
    pub last_seen_inferred: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub system: SystemInfo,
    pub hardware: HardwareInfo,
    pub network: NetworkSummary,
    pub security: SecurityInfo,
    pub applications: ApplicationsSummary,
    pub installs: InstallsSummary,
    pub profiles: ProfilesSummary,
    #[serde(default)]
    pub events: Vec<DeviceEvent>,
}

impl CanonicalDevice {
    /// Primary IP for list views.
    pub fn primary_ip(&self) -> Option<&str> {
        self.network.primary_ip()
    }

    /// Best display name: explicit name, then hostname.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.system.hostname.as_deref())
            .or(self.network.hostname.as_deref())
            .unwrap_or(&self.serial_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(DeviceStatus::parse(" Warning "), Some(DeviceStatus::Warning));
        assert_eq!(DeviceStatus::parse("online"), None);
        assert_eq!(DeviceStatus::Missing.to_string(), "missing");
    }

    #[test]
    fn test_derive_status_windows() {
        let t = StatusThresholds::default();
        let at = |d: Duration| derive_status(Some(now() - d), now(), &t);
        assert_eq!(at(Duration::minutes(5)), DeviceStatus::Active);
        assert_eq!(at(Duration::days(3)), DeviceStatus::Stale);
        assert_eq!(at(Duration::days(30)), DeviceStatus::Missing);
        assert_eq!(at(Duration::hours(-2)), DeviceStatus::Active);
        assert_eq!(derive_status(None, now(), &t), DeviceStatus::Missing);
    }

    #[test]
    fn test_custom_thresholds() {
        let t = StatusThresholds {
            active_hours: 1,
            stale_days: 2,
        };
        let at = |d: Duration| derive_status(Some(now() - d), now(), &t);
        assert_eq!(at(Duration::minutes(59)), DeviceStatus::Active);
        assert_eq!(at(Duration::hours(1)), DeviceStatus::Stale);
        assert_eq!(at(Duration::days(2)), DeviceStatus::Missing);
    }
}
