//! Module registry.
//!
//! Maps each collection domain to the raw keys it has shipped under across
//! collector versions. Lookup checks `modules.<alias>` first and then the
//! legacy layout where modules sat at the root of the device record.
//!
//! The registry is a plain value handed to the [`crate::Normalizer`]; callers
//! that see a new alias extend their own copy with [`ModuleRegistry::with_alias`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use tracing::warn;

use crate::reconcile::is_absent;

/// Collection domains the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    System,
    Hardware,
    Network,
    Security,
    Applications,
    Installs,
    Profiles,
    Policies,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 8] = [
        ModuleKind::System,
        ModuleKind::Hardware,
        ModuleKind::Network,
        ModuleKind::Security,
        ModuleKind::Applications,
        ModuleKind::Installs,
        ModuleKind::Profiles,
        ModuleKind::Policies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::System => "system",
            ModuleKind::Hardware => "hardware",
            ModuleKind::Network => "network",
            ModuleKind::Security => "security",
            ModuleKind::Applications => "applications",
            ModuleKind::Installs => "installs",
            ModuleKind::Profiles => "profiles",
            ModuleKind::Policies => "policies",
        }
    }

    fn default_aliases(&self) -> &'static [&'static str] {
        match self {
            ModuleKind::System => &["system", "os", "inventory", "operatingSystem"],
            ModuleKind::Hardware => &["hardware", "hw"],
            ModuleKind::Network => &["network", "networking"],
            ModuleKind::Security => &["security"],
            ModuleKind::Applications => &["applications", "apps", "software"],
            ModuleKind::Installs => &[
                "installs",
                "managedInstalls",
                "managed_installs",
                "cimian",
                "munki",
            ],
            ModuleKind::Profiles => &["profiles", "mdm", "management"],
            ModuleKind::Policies => &["policies", "policy"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRegistry {
    entries: Vec<(ModuleKind, Vec<String>)>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self {
            entries: ModuleKind::ALL
                .iter()
                .map(|kind| {
                    let aliases = kind
                        .default_aliases()
                        .iter()
                        .map(|a| a.to_string())
                        .collect();
                    (*kind, aliases)
                })
                .collect(),
        }
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an alias; lower priority than the existing ones.
    pub fn with_alias(mut self, kind: ModuleKind, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        if let Some((_, aliases)) = self.entries.iter_mut().find(|(k, _)| *k == kind) {
            if !aliases.contains(&alias) {
                aliases.push(alias);
            }
        }
        self
    }

    pub fn aliases(&self, kind: ModuleKind) -> &[String] {
        self.entries
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, aliases)| aliases.as_slice())
            .unwrap_or(&[])
    }

    /// Find a module's payload in a raw device record.
    ///
    /// Some API versions double-encode module payloads as JSON strings; those
    /// are decoded here so downstream code only sees structured values.
    pub fn locate<'a>(&self, raw: &'a Value, kind: ModuleKind) -> Option<Cow<'a, Value>> {
        let modules = raw.get("modules").filter(|m| m.is_object());
        let scopes = modules
            .map(|m| (m, true))
            .into_iter()
            .chain(std::iter::once((raw, false)));

        for (scope, is_modules_map) in scopes {
            for alias in self.aliases(kind) {
                match scope.get(alias.as_str()) {
                    Some(value) if is_absent(value) => continue,
                    Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
                        Ok(decoded) if decoded.is_object() || decoded.is_array() => {
                            return Some(Cow::Owned(decoded));
                        }
                        // Root-level scalars are ordinary device fields ("os": "macOS").
                        _ if is_modules_map => {
                            warn!(module = kind.as_str(), alias = %alias, "module payload is not structured, ignoring");
                        }
                        _ => {}
                    },
                    Some(value) if value.is_object() || value.is_array() => {
                        return Some(Cow::Borrowed(value));
                    }
                    Some(_) if is_modules_map => {
                        warn!(module = kind.as_str(), alias = %alias, "module payload is a scalar, ignoring");
                    }
                    _ => {}
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_layout_preferred_over_legacy() {
        let raw = json!({
            "modules": {"hardware": {"model": "new"}},
            "hardware": {"model": "legacy"}
        });
        let registry = ModuleRegistry::new();
        let hw = registry.locate(&raw, ModuleKind::Hardware).unwrap();
        assert_eq!(hw["model"], "new");
    }

    #[test]
    fn test_legacy_root_layout() {
        let raw = json!({"serialNumber": "X", "network": {"hostname": "h"}});
        let registry = ModuleRegistry::new();
        assert!(registry.locate(&raw, ModuleKind::Network).is_some());
        assert!(registry.locate(&raw, ModuleKind::Security).is_none());
    }

    #[test]
    fn test_alias_and_custom_alias() {
        let raw = json!({"modules": {"managed_installs": {"items": []}, "telemetryApps": []}});
        let registry = ModuleRegistry::new();
        assert!(registry.locate(&raw, ModuleKind::Installs).is_some());
        assert!(registry.locate(&raw, ModuleKind::Applications).is_none());

        let registry = registry.with_alias(ModuleKind::Applications, "telemetryApps");
        assert!(registry.locate(&raw, ModuleKind::Applications).is_some());
    }

    #[test]
    fn test_double_encoded_module() {
        let raw = json!({"modules": {"security": "{\"firewall\": {\"enabled\": true}}"}});
        let registry = ModuleRegistry::new();
        let security = registry.locate(&raw, ModuleKind::Security).unwrap();
        assert_eq!(security["firewall"]["enabled"], true);
    }

    #[test]
    fn test_placeholder_and_scalar_modules_are_skipped() {
        let raw = json!({"modules": {"system": "null", "os": 12, "inventory": {"hostname": "h"}}});
        let registry = ModuleRegistry::new();
        let system = registry.locate(&raw, ModuleKind::System).unwrap();
        assert_eq!(system["hostname"], "h");
    }
}
