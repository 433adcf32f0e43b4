//! Policy/setting grouping.
//!
//! Raw policy telemetry arrives as one record per area (or per setting) with
//! heavy provider bookkeeping mixed in. This module turns it into a handful
//! of [`PolicyGroup`]s:
//!
//! 1. areas named by a UUID or a non-informative token are container noise
//! 2. records are grouped by raw area name
//! 3. in a configuration object, `<name>_ProviderSet` carries the committed
//!    value; `<name>_WinningProvider` and `<name>_LastWrite` are bookkeeping
//!    and never become settings
//! 4. a group with nothing in its configuration objects falls back to
//!    name/value pairs; if that is empty too the group is dropped
//! 5. groups whose display names collide are merged, first setting wins
//! 6. settings are sorted by display name

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use tracing::debug;

use crate::config::PolicySettings;
use crate::reconcile::{as_bool, is_absent, value_to_string};

mod fields {
    use crate::reconcile::Field;

    pub const AREA: Field = Field::new(
        "area",
        &[
            "policy_name",
            "policyName",
            "PolicyName",
            "area",
            "Area",
            "areaName",
            "area_name",
            "policyArea",
            "category",
            "Category",
        ],
    );
    pub const CONFIGURATION: Field = Field::new(
        "configuration",
        &["configuration", "Configuration", "config", "values", "policyValues"],
    );
    pub const SETTINGS: Field = Field::new(
        "settings",
        &["settings", "Settings", "settingValues", "setting_values", "entries"],
    );
    pub const SETTING_NAME: Field = Field::new(
        "name",
        &["settingName", "setting_name", "SettingName", "name", "Name", "key", "Key", "valueName"],
    );
    pub const SETTING_VALUE: Field = Field::new(
        "value",
        &["value", "Value", "settingValue", "setting_value", "currentValue", "data", "Data"],
    );
    pub const SOURCE: Field = Field::new(
        "source",
        &["source", "Source", "provider", "Provider", "origin", "policySource", "policy_source"],
    );
}

const COMMITTED_SUFFIX: &str = "_ProviderSet";
const METADATA_SUFFIXES: &[&str] = &["_WinningProvider", "_LastWrite"];
const NOISE_AREAS: &[&str] = &["current", "default", "providers"];

fn uuid_re() -> &'static Regex {
    static UUID_RE: OnceLock<Regex> = OnceLock::new();
    UUID_RE.get_or_init(|| {
        Regex::new(
            r"^\{?[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\}?$",
        )
        .expect("valid uuid regex")
    })
}

/// Area display names for the raw names collectors use.
const AREA_NAMES: &[(&str, &str)] = &[
    ("defender", "Windows Defender"),
    ("windowsdefender", "Windows Defender"),
    ("microsoftdefender", "Windows Defender"),
    ("defenderatp", "Windows Defender"),
    ("edge", "Microsoft Edge"),
    ("microsoftedge", "Microsoft Edge"),
    ("browser", "Microsoft Edge"),
    ("update", "Windows Update"),
    ("windowsupdate", "Windows Update"),
    ("updateorchestrator", "Windows Update"),
    ("bitlocker", "BitLocker"),
    ("firewall", "Windows Firewall"),
    ("mdmstore", "Windows Firewall"),
    ("devicelock", "Device Lock"),
    ("passportforwork", "Windows Hello for Business"),
    ("windowshelloforbusiness", "Windows Hello for Business"),
    ("applicationcontrol", "Application Control"),
    ("applocker", "Application Control"),
    ("localpoliciessecurityoptions", "Local Security Options"),
    ("windowsdefendersecuritycenter", "Windows Security Center"),
    ("experience", "Windows Experience"),
    ("privacy", "Privacy"),
    ("storage", "Storage"),
    ("system", "System"),
    ("office", "Microsoft Office"),
    ("onedrive", "OneDrive"),
    ("onedrivengsc", "OneDrive"),
    ("softwareupdate", "Software Update"),
    ("filevault", "FileVault"),
    ("gatekeeper", "Gatekeeper"),
    ("systempolicycontrol", "Gatekeeper"),
    ("screensaver", "Screen Saver"),
    ("loginwindow", "Login Window"),
    ("passcode", "Passcode"),
];

/// Decides which raw area names are container noise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoiseFilter {
    extra: Vec<String>,
}

impl NoiseFilter {
    pub fn from_settings(settings: &PolicySettings) -> Self {
        Self {
            extra: settings
                .extra_noise_areas
                .iter()
                .map(|a| a.trim().to_ascii_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    pub fn is_noise(&self, area: &str) -> bool {
        let trimmed = area.trim();
        let lower = trimmed.to_ascii_lowercase();
        trimmed.is_empty()
            || uuid_re().is_match(trimmed)
            || NOISE_AREAS.contains(&lower.as_str())
            || self.extra.contains(&lower)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySetting {
    pub name: String,
    pub display_name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Came from a `_ProviderSet` key
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub committed: bool,
}

impl PolicySetting {
    fn new(name: &str, value: &Value, source: Option<&str>) -> Option<Self> {
        if is_absent(value) {
            return None;
        }
        let rendered = match value {
            Value::Object(_) | Value::Array(_) => value.to_string(),
            other => value_to_string(other)?,
        };
        Some(Self {
            name: name.to_string(),
            display_name: humanize(name),
            enabled: as_bool(value),
            value: rendered,
            source: source.map(str::to_string),
            committed: false,
        })
    }

    fn committed(mut self, committed: bool) -> Self {
        self.committed = committed;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyGroup {
    pub name: String,
    /// Raw area names merged into this group
    pub area_keys: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    pub settings_count: usize,
    pub settings: Vec<PolicySetting>,
}

/// Setting name used for de-duplication.
pub fn normalize_setting_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn is_metadata_key(key: &str) -> bool {
    METADATA_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
}

/// Last segment of an OMA-URI style path ("./Vendor/MSFT/Policy/Config/Defender").
fn area_tail(area: &str) -> &str {
    area.trim()
        .trim_end_matches('/')
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(area)
}

/// Display name for a raw area.
pub fn area_display_name(area: &str) -> String {
    let tail = area_tail(area);
    let key = normalize_setting_name(tail);
    AREA_NAMES
        .iter()
        .find(|(raw, _)| *raw == key)
        .map(|(_, display)| display.to_string())
        .unwrap_or_else(|| humanize(tail))
}

/// "AllowRealtimeMonitoring" -> "Allow Realtime Monitoring", "max_idle" -> "Max Idle".
pub fn humanize(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || c == '.' || c.is_whitespace() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let boundary = c.is_uppercase()
            && !current.is_empty()
            && (prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit())
                || (next.is_some_and(|n| n.is_lowercase()) && prev.is_some_and(|p| p.is_uppercase())));
        if boundary {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .into_iter()
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(first) => first.to_uppercase().chain(cs).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Configuration objects may arrive double-encoded.
fn configuration_object(record: &Value) -> Option<Value> {
    match fields::CONFIGURATION.resolve(record)? {
        obj @ Value::Object(_) => Some(obj.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s).ok().filter(Value::is_object),
        _ => None,
    }
}

/// Primary source: the configuration object.
fn settings_from_configuration(config: &Value, source: Option<&str>) -> Vec<PolicySetting> {
    let Value::Object(map) = config else {
        return Vec::new();
    };
    let committed: HashSet<&str> = map
        .keys()
        .filter_map(|k| k.strip_suffix(COMMITTED_SUFFIX))
        .collect();

    let mut out = Vec::new();
    for (key, value) in map {
        if is_metadata_key(key) {
            continue;
        }
        let (name, is_committed) = match key.strip_suffix(COMMITTED_SUFFIX) {
            Some(base) => (base, true),
            // A plain key shadowed by its committed value is stale.
            None if committed.contains(key.as_str()) => continue,
            None => (key.as_str(), false),
        };
        if let Some(setting) = PolicySetting::new(name, value, source) {
            out.push(setting.committed(is_committed));
        }
    }
    out
}

/// Secondary source: name/value pairs, in a settings array or on the record.
fn settings_from_pairs(record: &Value, source: Option<&str>) -> Vec<PolicySetting> {
    let mut pairs: Vec<&Value> = fields::SETTINGS.records(record);
    if pairs.is_empty() {
        pairs.push(record);
    }
    pairs
        .into_iter()
        .filter_map(|pair| {
            let name = fields::SETTING_NAME.string(pair)?;
            if is_metadata_key(&name) {
                return None;
            }
            let (base, is_committed) = match name.strip_suffix(COMMITTED_SUFFIX) {
                Some(base) => (base, true),
                None => (name.as_str(), false),
            };
            let value = fields::SETTING_VALUE.resolve(pair)?;
            PolicySetting::new(base, value, source).map(|s| s.committed(is_committed))
        })
        .collect()
}

struct RawGroup<'a> {
    area: String,
    records: Vec<&'a Value>,
}

/// Group flat policy records into policy areas.
pub fn group_policies(records: &[&Value], noise: &NoiseFilter) -> Vec<PolicyGroup> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut raw_groups: Vec<RawGroup> = Vec::new();

    for record in records {
        let Some(area) = fields::AREA.string(record) else {
            continue;
        };
        if noise.is_noise(&area) {
            debug!(area = %area, "skipping container policy area");
            continue;
        }
        match index.get(&area) {
            Some(&i) => raw_groups[i].records.push(record),
            None => {
                index.insert(area.clone(), raw_groups.len());
                raw_groups.push(RawGroup {
                    area,
                    records: vec![record],
                });
            }
        }
    }

    let mut by_display: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<PolicyGroup> = Vec::new();

    for raw in raw_groups {
        let mut sources: Vec<String> = Vec::new();
        let mut settings: Vec<PolicySetting> = Vec::new();
        for record in &raw.records {
            let source = fields::SOURCE.string(record);
            if let Some(config) = configuration_object(record) {
                settings.extend(settings_from_configuration(&config, source.as_deref()));
            }
            if let Some(source) = source {
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
        }
        if settings.is_empty() {
            for record in &raw.records {
                let source = fields::SOURCE.string(record);
                settings.extend(settings_from_pairs(record, source.as_deref()));
            }
        }
        if settings.is_empty() {
            debug!(area = %raw.area, "policy area has no settings, dropping");
            continue;
        }

        let display = area_display_name(&raw.area);
        let slot = match by_display.get(&display) {
            Some(&i) => i,
            None => {
                by_display.insert(display.clone(), groups.len());
                groups.push(PolicyGroup {
                    name: display,
                    area_keys: Vec::new(),
                    sources: Vec::new(),
                    settings_count: 0,
                    settings: Vec::new(),
                });
                groups.len() - 1
            }
        };
        merge_into(&mut groups[slot], raw.area, sources, settings);
    }

    for group in &mut groups {
        group
            .settings
            .sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.name.cmp(&b.name)));
        group.settings_count = group.settings.len();
    }
    groups.sort_by(|a, b| a.name.cmp(&b.name));
    groups
}

fn merge_into(group: &mut PolicyGroup, area: String, sources: Vec<String>, settings: Vec<PolicySetting>) {
    if !group.area_keys.contains(&area) {
        group.area_keys.push(area);
    }
    for source in sources {
        if !group.sources.contains(&source) {
            group.sources.push(source);
        }
    }
    let mut seen: HashMap<String, usize> = group
        .settings
        .iter()
        .enumerate()
        .map(|(i, s)| (normalize_setting_name(&s.name), i))
        .collect();
    // First seen wins, except that a committed value replaces an uncommitted one.
    for setting in settings {
        match seen.get(&normalize_setting_name(&setting.name)) {
            Some(&i) => {
                if setting.committed && !group.settings[i].committed {
                    group.settings[i] = setting;
                }
            }
            None => {
                seen.insert(normalize_setting_name(&setting.name), group.settings.len());
                group.settings.push(setting);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn group(records: Value) -> Vec<PolicyGroup> {
        let list: Vec<&Value> = records.as_array().unwrap().iter().collect();
        group_policies(&list, &NoiseFilter::default())
    }

    #[test]
    fn test_defender_provider_set() {
        let groups = group(json!([
            {"policy_name": "Defender", "configuration": {"AllowRealtimeMonitoring_ProviderSet": "1"}}
        ]));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Windows Defender");
        assert_eq!(groups[0].settings_count, 1);
        let setting = &groups[0].settings[0];
        assert_eq!(setting.name, "AllowRealtimeMonitoring");
        assert_eq!(setting.value, "1");
        assert_eq!(setting.enabled, Some(true));
    }

    #[test]
    fn test_metadata_only_area_is_dropped() {
        let groups = group(json!([
            {"policy_name": "Edge", "configuration": {
                "HomepageLocation_WinningProvider": "{A1B2}",
                "HomepageLocation_LastWrite": "1"
            }}
        ]));
        assert!(groups.is_empty());
    }

    #[test]
    fn test_committed_value_shadows_plain_key() {
        let groups = group(json!([
            {"area": "DeviceLock", "configuration": {
                "MaxInactivityTimeDeviceLock": "15",
                "MaxInactivityTimeDeviceLock_ProviderSet": "5",
                "MaxInactivityTimeDeviceLock_WinningProvider": "MDM"
            }}
        ]));
        assert_eq!(groups[0].name, "Device Lock");
        assert_eq!(groups[0].settings.len(), 1);
        assert_eq!(groups[0].settings[0].value, "5");
        assert_eq!(groups[0].settings[0].enabled, None);
    }

    #[test]
    fn test_committed_value_wins_across_records() {
        let groups = group(json!([
            {"policy_name": "Defender", "configuration": {"AllowRealtimeMonitoring": "0"}},
            {"policy_name": "Defender", "configuration": {"AllowRealtimeMonitoring_ProviderSet": "1"}},
            {"policy_name": "Defender", "configuration": {"AllowRealtimeMonitoring": "0"}}
        ]));
        assert_eq!(groups[0].settings.len(), 1);
        let setting = &groups[0].settings[0];
        assert_eq!(setting.value, "1");
        assert_eq!(setting.enabled, Some(true));
        assert!(setting.committed);
    }

    #[test]
    fn test_noise_areas() {
        let groups = group(json!([
            {"policy_name": "8F0A6C57-6D3B-4C77-9E59-4E5C0C8B2C41", "configuration": {"x_ProviderSet": "1"}},
            {"policy_name": "{8f0a6c57-6d3b-4c77-9e59-4e5c0c8b2c41}", "configuration": {"x_ProviderSet": "1"}},
            {"policy_name": "Providers", "configuration": {"x_ProviderSet": "1"}},
            {"policy_name": "current", "configuration": {"x_ProviderSet": "1"}}
        ]));
        assert!(groups.is_empty());

        let noise = NoiseFilter::from_settings(&PolicySettings {
            extra_noise_areas: vec!["Knobs".to_string()],
        });
        assert!(noise.is_noise("knobs"));
        assert!(!noise.is_noise("Defender"));
    }

    #[test]
    fn test_settings_array_fallback() {
        let groups = group(json!([
            {"policyName": "Browser", "configuration": {}, "settings": [
                {"name": "AllowSmartScreen", "value": true},
                {"name": "AllowSmartScreen_LastWrite", "value": "1"}
            ]}
        ]));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Microsoft Edge");
        assert_eq!(groups[0].settings[0].value, "true");
    }

    #[test]
    fn test_groups_from_two_wire_formats_merge() {
        let groups = group(json!([
            {"policy_name": "Defender", "source": "MDM",
             "configuration": {"AllowCloudProtection_ProviderSet": "1", "PUAProtection_ProviderSet": "2"}},
            {"area": "./Vendor/MSFT/Policy/Config/WindowsDefender", "source": "GroupPolicy",
             "settingName": "allow_cloud_protection", "value": 0},
            {"area": "./Vendor/MSFT/Policy/Config/WindowsDefender", "source": "GroupPolicy",
             "settingName": "AllowArchiveScanning", "value": 1}
        ]));
        assert_eq!(groups.len(), 1);
        let defender = &groups[0];
        assert_eq!(defender.area_keys.len(), 2);
        assert_eq!(defender.sources, vec!["MDM", "GroupPolicy"]);
        assert_eq!(defender.settings_count, 3);
        let names: Vec<&str> = defender.settings.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["AllowArchiveScanning", "AllowCloudProtection", "PUAProtection"]);
        assert_eq!(defender.settings[1].value, "1");
    }

    #[test]
    fn test_double_encoded_configuration() {
        let groups = group(json!([
            {"policy_name": "Update", "configuration": "{\"ActiveHoursStart_ProviderSet\": 8}"}
        ]));
        assert_eq!(groups[0].name, "Windows Update");
        assert_eq!(groups[0].settings[0].value, "8");
    }

    #[test]
    fn test_humanize_and_display_names() {
        assert_eq!(humanize("AllowRealtimeMonitoring"), "Allow Realtime Monitoring");
        assert_eq!(humanize("max_idle_time"), "Max Idle Time");
        assert_eq!(humanize("PUAProtection"), "PUA Protection");
        assert_eq!(area_display_name("CustomVendorArea"), "Custom Vendor Area");
        assert_eq!(area_display_name("defender"), "Windows Defender");
    }
}
