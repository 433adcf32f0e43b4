//! Normalization settings.
//!
//! Every knob has a serde default, so an empty or partial `fleet.toml` is
//! valid. Out-of-range values are kept as written and clamped on read through
//! the `effective_*` accessors.
//!
//! ```toml
//! [status]
//! active_hours = 24
//! stale_days = 7
//!
//! [network]
//! extra_virtual_mac_prefixes = ["00:1a:4a"]
//!
//! [events]
//! max_events = 50
//! ```

use crate::error::{FleetError, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Default config file name looked up by the CLI.
pub const CONFIG_FILE: &str = "fleet.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizeConfig {
    #[serde(default)]
    pub status: StatusThresholds,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub policy: PolicySettings,

    #[serde(default)]
    pub events: EventSettings,
}

/// Age windows for status derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusThresholds {
    /// Seen within this many hours → active (valid: 1-168)
    #[serde(default = "default_active_hours")]
    pub active_hours: i64,

    /// Seen within this many days → stale, otherwise missing
    #[serde(default = "default_stale_days")]
    pub stale_days: i64,
}

fn default_active_hours() -> i64 {
    24
}

fn default_stale_days() -> i64 {
    7
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            active_hours: default_active_hours(),
            stale_days: default_stale_days(),
        }
    }
}

impl StatusThresholds {
    pub fn effective_active_window(&self) -> Duration {
        Duration::hours(self.active_hours.clamp(1, 168))
    }

    /// Never shorter than the active window.
    pub fn effective_stale_window(&self) -> Duration {
        let stale = Duration::days(self.stale_days.clamp(1, 3650));
        stale.max(self.effective_active_window())
    }
}

/// Additions to the built-in virtual adapter signatures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// MAC OUI prefixes, any case, `:` or `-` separated
    #[serde(default)]
    pub extra_virtual_mac_prefixes: Vec<String>,

    /// IPv4 prefixes such as "10.37.129."
    #[serde(default)]
    pub extra_virtual_ip_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Area names treated as container noise, compared case-insensitively
    #[serde(default)]
    pub extra_noise_areas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSettings {
    /// Events kept per device, newest first (valid: 1-1000)
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

fn default_max_events() -> usize {
    50
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
        }
    }
}

impl EventSettings {
    pub fn effective_max_events(&self) -> usize {
        self.max_events.clamp(1, 1000)
    }
}

impl NormalizeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        if !path.is_file() {
            return Err(FleetError::Config(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = NormalizeConfig::from_toml_str("").unwrap();
        assert_eq!(config, NormalizeConfig::default());
        assert_eq!(config.status.effective_active_window(), Duration::hours(24));
        assert_eq!(config.status.effective_stale_window(), Duration::days(7));
        assert_eq!(config.events.effective_max_events(), 50);
    }

    #[test]
    fn test_partial_config() {
        let config = NormalizeConfig::from_toml_str(
            r#"
            [status]
            stale_days = 14

            [network]
            extra_virtual_mac_prefixes = ["00:1A:4A"]
            "#,
        )
        .unwrap();
        assert_eq!(config.status.active_hours, 24);
        assert_eq!(config.status.stale_days, 14);
        assert_eq!(config.network.extra_virtual_mac_prefixes, vec!["00:1A:4A"]);
    }

    #[test]
    fn test_clamping() {
        let thresholds = StatusThresholds {
            active_hours: 500,
            stale_days: 0,
        };
        assert_eq!(thresholds.effective_active_window(), Duration::hours(168));
        assert_eq!(thresholds.effective_stale_window(), Duration::hours(168));

        let events = EventSettings { max_events: 0 };
        assert_eq!(events.effective_max_events(), 1);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let err = NormalizeConfig::from_toml_str("[status]\nactive_hours = \"soon\"").unwrap_err();
        assert!(matches!(err, FleetError::Toml(_)));
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(NormalizeConfig::load(&missing).unwrap(), NormalizeConfig::default());

        let path = dir.path().join(CONFIG_FILE);
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[events]\nmax_events = 5").unwrap();
        assert_eq!(NormalizeConfig::load(&path).unwrap().events.max_events, 5);

        assert!(matches!(
            NormalizeConfig::load(dir.path()),
            Err(FleetError::Config(_))
        ));
    }
}
