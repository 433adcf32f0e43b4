//! Configuration profiles, MDM enrollment and policy groups.
//!
//! The same profile identifier can be reported several times (user and
//! device scope, or a stale copy left behind by a reinstall). Only one is
//! current, chosen by a named rule: the most recent install date wins and
//! the first reported wins ties. A missing install date loses to any date.
//! This is a best guess; the collectors do not flag the active copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

use crate::policy::{group_policies, NoiseFilter, PolicyGroup};
use crate::timestamp::parse_timestamp;

mod fields {
    use crate::reconcile::Field;

    pub const LIST: Field = Field::new(
        "profiles",
        &[
            "profiles",
            "configurationProfiles",
            "configuration_profiles",
            "installedProfiles",
            "installed_profiles",
            "items",
        ],
    );
    pub const IDENTIFIER: Field = Field::new(
        "identifier",
        &["identifier", "profileIdentifier", "profile_identifier", "PayloadIdentifier", "id", "Id"],
    );
    pub const NAME: Field = Field::new(
        "name",
        &["displayName", "display_name", "PayloadDisplayName", "name", "Name", "profileName"],
    );
    pub const ORGANIZATION: Field = Field::new(
        "organization",
        &["organization", "PayloadOrganization", "organisation", "vendor"],
    );
    pub const INSTALL_DATE: Field = Field::new(
        "installDate",
        &["installDate", "install_date", "ProfileInstallDate", "installedAt", "installed_at", "lastModified"],
    );
    pub const SCOPE: Field = Field::new("scope", &["scope", "ProfileScope", "level", "target"]);
    pub const PAYLOADS: Field = Field::new(
        "payloads",
        &["payloads", "ProfileItems", "profileItems", "PayloadContent", "payloadContent", "settings"],
    );
    pub const PAYLOAD_TYPE: Field = Field::new(
        "type",
        &["type", "PayloadType", "payloadType", "payload_type"],
    );
    pub const PAYLOAD_NAME: Field = Field::new(
        "displayName",
        &["displayName", "PayloadDisplayName", "name", "Name"],
    );
    pub const PAYLOAD_IDENTIFIER: Field = Field::new(
        "identifier",
        &["identifier", "PayloadIdentifier", "id"],
    );

    pub const POLICIES: Field = Field::new(
        "policies",
        &["policies", "intunePolicies", "intune_policies", "policySettings", "policy_settings", "configurationPolicies"],
    );

    pub const MDM: Field = Field::new(
        "mdm",
        &["mdm", "mdmEnrollment", "mdm_enrollment", "enrollment"],
    );
    pub const ENROLLED: Field = Field::new(
        "enrolled",
        &["enrolled", "isEnrolled", "is_enrolled", "mdmEnrolled", "Enrolled", "status"],
    );
    pub const PROVIDER: Field = Field::new(
        "provider",
        &["provider", "vendor", "mdmProvider", "ProviderName", "name"],
    );
    pub const SERVER_URL: Field = Field::new(
        "serverUrl",
        &["serverUrl", "server_url", "serverURL", "ServerURL", "url"],
    );
    pub const ENROLLMENT_TYPE: Field = Field::new(
        "enrollmentType",
        &["enrollmentType", "enrollment_type", "EnrollmentType", "type"],
    );
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationProfile {
    pub identifier: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub payload_count: usize,
    #[serde(default)]
    pub payloads: Vec<PayloadSummary>,
}

impl ConfigurationProfile {
    fn from_value(record: &Value) -> Option<Self> {
        let identifier = fields::IDENTIFIER.string(record)?;
        let payloads: Vec<PayloadSummary> = fields::PAYLOADS
            .records(record)
            .into_iter()
            .map(|p| PayloadSummary {
                payload_type: fields::PAYLOAD_TYPE.string(p),
                display_name: fields::PAYLOAD_NAME.string(p),
                identifier: fields::PAYLOAD_IDENTIFIER.string(p),
            })
            .collect();
        Some(Self {
            name: fields::NAME.string(record).unwrap_or_else(|| identifier.clone()),
            identifier,
            organization: fields::ORGANIZATION.string(record),
            install_date: fields::INSTALL_DATE.find_map(record, parse_timestamp),
            scope: fields::SCOPE.string(record),
            payload_count: payloads.len(),
            payloads,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MdmEnrollment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrolled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilesSummary {
    #[serde(default)]
    pub profiles: Vec<ConfigurationProfile>,
    #[serde(default)]
    pub policies: Vec<PolicyGroup>,
    #[serde(default)]
    pub mdm: MdmEnrollment,
}

/// Keep one profile per identifier: most recent install date, first reported on ties.
pub fn select_current_profiles(profiles: Vec<ConfigurationProfile>) -> Vec<ConfigurationProfile> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ConfigurationProfile> = Vec::new();
    for profile in profiles {
        match index.get(&profile.identifier) {
            Some(&i) => {
                if profile.install_date > out[i].install_date {
                    debug!(identifier = %profile.identifier, "newer duplicate profile replaces earlier copy");
                    out[i] = profile;
                }
            }
            None => {
                index.insert(profile.identifier.clone(), out.len());
                out.push(profile);
            }
        }
    }
    out.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.identifier.cmp(&b.identifier))
    });
    out
}

/// `module` is the profiles payload; `legacy_policies` the root-level
/// policies payload older collectors send next to it.
pub fn normalize_profiles(
    module: Option<&Value>,
    legacy_policies: Option<&Value>,
    noise: &NoiseFilter,
) -> ProfilesSummary {
    let profile_records: Vec<&Value> = match module {
        Some(Value::Array(items)) => items.iter().filter(|i| i.is_object()).collect(),
        Some(obj) => fields::LIST.records(obj),
        None => Vec::new(),
    };
    let profiles = select_current_profiles(
        profile_records
            .iter()
            .filter_map(|r| ConfigurationProfile::from_value(r))
            .collect(),
    );

    let mut policy_records: Vec<&Value> = module
        .filter(|m| m.is_object())
        .map(|m| fields::POLICIES.all_records(m))
        .unwrap_or_default();
    match legacy_policies {
        Some(Value::Array(items)) => policy_records.extend(items.iter().filter(|i| i.is_object())),
        Some(obj) => policy_records.extend(fields::POLICIES.all_records(obj)),
        None => {}
    }
    let policies = group_policies(&policy_records, noise);

    let mdm = module
        .and_then(|m| fields::MDM.object(m))
        .map(|m| MdmEnrollment {
            enrolled: fields::ENROLLED.bool(m),
            provider: fields::PROVIDER.string(m),
            server_url: fields::SERVER_URL.string(m),
            enrollment_type: fields::ENROLLMENT_TYPE.string(m),
        })
        .unwrap_or_default();

    ProfilesSummary {
        profiles,
        policies,
        mdm,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn normalize(module: Value) -> ProfilesSummary {
        normalize_profiles(Some(&module), None, &NoiseFilter::default())
    }

    #[test]
    fn test_profiles_with_payloads() {
        let summary = normalize(json!({"profiles": [{
            "PayloadIdentifier": "com.example.wifi",
            "PayloadDisplayName": "Corporate Wi-Fi",
            "PayloadOrganization": "Example",
            "ProfileInstallDate": "2024-03-01 09:00:00 +0000",
            "ProfileItems": [
                {"PayloadType": "com.apple.wifi.managed", "PayloadDisplayName": "Wi-Fi"},
                {"PayloadType": "com.apple.security.pkcs1"}
            ]
        }]}));
        assert_eq!(summary.profiles.len(), 1);
        let profile = &summary.profiles[0];
        assert_eq!(profile.name, "Corporate Wi-Fi");
        assert_eq!(profile.payload_count, 2);
        assert_eq!(profile.payloads[0].payload_type.as_deref(), Some("com.apple.wifi.managed"));
        assert!(profile.install_date.is_some());
    }

    #[test]
    fn heuristic_duplicate_profile_most_recent_install_wins() {
        let summary = normalize(json!({"profiles": [
            {"identifier": "com.example.vpn", "name": "VPN (old)", "installDate": "2024-01-01T00:00:00Z"},
            {"identifier": "com.example.vpn", "name": "VPN (new)", "installDate": "2024-04-01T00:00:00Z"},
            {"identifier": "com.example.vpn", "name": "VPN (undated)"}
        ]}));
        assert_eq!(summary.profiles.len(), 1);
        assert_eq!(summary.profiles[0].name, "VPN (new)");
    }

    #[test]
    fn heuristic_duplicate_profile_tie_keeps_first_reported() {
        let summary = normalize(json!({"profiles": [
            {"identifier": "p", "name": "First", "installDate": "2024-01-01T00:00:00Z"},
            {"identifier": "p", "name": "Second", "installDate": "2024-01-01T00:00:00Z"}
        ]}));
        assert_eq!(summary.profiles[0].name, "First");
    }

    #[test]
    fn test_policies_from_module_and_legacy_root() {
        let module = json!({"intunePolicies": [
            {"policy_name": "Defender", "configuration": {"AllowRealtimeMonitoring_ProviderSet": "1"}}
        ]});
        let legacy = json!([
            {"policy_name": "Edge", "configuration": {"HomepageLocation_ProviderSet": "https://intranet"}}
        ]);
        let summary = normalize_profiles(Some(&module), Some(&legacy), &NoiseFilter::default());
        let names: Vec<&str> = summary.policies.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Microsoft Edge", "Windows Defender"]);
    }

    #[test]
    fn test_mdm_enrollment() {
        let summary = normalize(json!({"mdm": {"enrolled": "Yes", "provider": "Intune", "enrollmentType": "DEP"}}));
        assert_eq!(summary.mdm.enrolled, Some(true));
        assert_eq!(summary.mdm.provider.as_deref(), Some("Intune"));
        assert!(summary.profiles.is_empty());
    }

    #[test]
    fn test_missing_module() {
        let summary = normalize_profiles(None, None, &NoiseFilter::default());
        assert_eq!(summary, ProfilesSummary::default());
    }
}
