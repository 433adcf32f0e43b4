//! Canonical device assembly.
//!
//! [`Normalizer`] bundles the settings, the module registry and the relative
//! time formatter, and turns one raw device record into a [`CanonicalDevice`].
//! Assembly never aborts on partial input: each sub-object degrades on its
//! own. The only fatal conditions are a record that is not an object and a
//! record with no identifier at all.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::applications::normalize_applications;
use crate::config::NormalizeConfig;
use crate::device::{derive_status, CanonicalDevice, DeviceStatus};
use crate::error::{FleetError, Result};
use crate::events::normalize_events;
use crate::hardware::normalize_hardware;
use crate::installs::normalize_installs;
use crate::network::{normalize_network, VirtualSignatures};
use crate::policy::NoiseFilter;
use crate::profiles::normalize_profiles;
use crate::reconcile::json_kind;
use crate::registry::{ModuleKind, ModuleRegistry};
use crate::security::normalize_security;
use crate::system::normalize_system;
use crate::timestamp::{parse_timestamp, CompactRelativeTime, RelativeTimeFormatter};

mod fields {
    use crate::reconcile::Field;

    pub const DEVICE_ID: Field = Field::new(
        "deviceId",
        &["deviceId", "device_id", "deviceID", "DeviceId", "id", "uuid", "machineId", "machine_id", "clientId"],
    );
    pub const SERIAL: Field = Field::new(
        "serialNumber",
        &[
            "serialNumber",
            "serial_number",
            "SerialNumber",
            "serial",
            "modules.hardware.serialNumber",
            "modules.hardware.serial_number",
            "modules.system.serialNumber",
            "modules.inventory.serialNumber",
            "hardware.serialNumber",
            "hardware.serial_number",
            "system.serialNumber",
            "inventory.serialNumber",
        ],
    );
    pub const LAST_SEEN: Field = Field::new(
        "lastSeen",
        &[
            "lastSeen",
            "last_seen",
            "lastCheckIn",
            "lastCheckin",
            "last_checkin",
            "lastContact",
            "lastUpdated",
            "last_updated",
            "updatedAt",
            "updated_at",
            "collectedAt",
            "collected_at",
            "metadata.collectedAt",
        ],
    );
    pub const STATUS: Field = Field::new("status", &["status", "deviceStatus", "device_status"]);
    pub const NAME: Field = Field::new(
        "name",
        &["name", "deviceName", "device_name", "computerName", "modules.inventory.deviceName", "inventory.deviceName"],
    );
    pub const ASSET_TAG: Field = Field::new(
        "assetTag",
        &["assetTag", "asset_tag", "modules.inventory.assetTag", "inventory.assetTag", "inventory.asset_tag"],
    );
    pub const LOCATION: Field = Field::new(
        "location",
        &["location", "modules.inventory.location", "inventory.location"],
    );
    pub const EVENTS: Field = Field::new("events", &["events", "recentEvents", "recent_events"]);
}

/// The normalization entry point.
#[derive(Clone)]
pub struct Normalizer {
    config: NormalizeConfig,
    registry: ModuleRegistry,
    formatter: Arc<dyn RelativeTimeFormatter>,
    signatures: VirtualSignatures,
    noise: NoiseFilter,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizeConfig::default())
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self {
            signatures: VirtualSignatures::from_settings(&config.network),
            noise: NoiseFilter::from_settings(&config.policy),
            registry: ModuleRegistry::default(),
            formatter: Arc::new(CompactRelativeTime),
            config,
        }
    }

    pub fn with_registry(mut self, registry: ModuleRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_formatter(mut self, formatter: impl RelativeTimeFormatter + 'static) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Normalize at the current time.
    pub fn normalize(&self, raw: &Value, events: Option<&Value>) -> Result<CanonicalDevice> {
        self.normalize_at(raw, events, Utc::now())
    }

    /// Normalize with an explicit processing time. Pure given its inputs.
    pub fn normalize_at(
        &self,
        raw: &Value,
        events: Option<&Value>,
        now: DateTime<Utc>,
    ) -> Result<CanonicalDevice> {
        let raw = unwrap_envelope(raw)?;

        let device_id = fields::DEVICE_ID.string(raw);
        let serial = fields::SERIAL.string(raw);
        let (device_id, serial_number) = match (device_id, serial) {
            (Some(id), Some(serial)) => (id, serial),
            (Some(id), None) => (id.clone(), id),
            (None, Some(serial)) => (serial.clone(), serial),
            (None, None) => return Err(FleetError::MissingIdentifiers),
        };

        let reported_seen = match fields::LAST_SEEN.resolve(raw) {
            None => None,
            Some(value) => {
                let parsed = parse_timestamp(value);
                if parsed.is_none() {
                    warn!(device = %serial_number, value = %value, "unparseable lastSeen, using processing time");
                }
                parsed
            }
        };
        let derived = derive_status(reported_seen, now, &self.config.status);
        let status = match fields::STATUS.string(raw) {
            Some(upstream) => DeviceStatus::parse(&upstream).unwrap_or_else(|| {
                debug!(device = %serial_number, status = %upstream, "unknown upstream status, deriving");
                derived
            }),
            None => derived,
        };
        let last_seen = reported_seen.unwrap_or(now);

        let module = |kind: ModuleKind| self.registry.locate(raw, kind);
        let system_module = module(ModuleKind::System);
        let system = normalize_system(system_module.as_deref(), raw, now);
        let network_module = module(ModuleKind::Network);
        let network = normalize_network(network_module.as_deref(), system.platform, &self.signatures);

        let events = events.or_else(|| fields::EVENTS.resolve(raw));

        Ok(CanonicalDevice {
            name: fields::NAME.string(raw).or_else(|| system.device_name.clone()),
            platform: system.platform,
            status,
            last_seen_label: self.formatter.format(last_seen, now),
            last_seen_inferred: reported_seen.is_none(),
            last_seen,
            asset_tag: fields::ASSET_TAG.string(raw),
            location: fields::LOCATION.string(raw),
            hardware: normalize_hardware(module(ModuleKind::Hardware).as_deref()),
            security: normalize_security(module(ModuleKind::Security).as_deref()),
            applications: normalize_applications(module(ModuleKind::Applications).as_deref()),
            installs: normalize_installs(module(ModuleKind::Installs).as_deref()),
            profiles: normalize_profiles(
                module(ModuleKind::Profiles).as_deref(),
                module(ModuleKind::Policies).as_deref(),
                &self.noise,
            ),
            events: normalize_events(events, self.config.events.effective_max_events()),
            system,
            network,
            device_id,
            serial_number,
        })
    }

    /// Normalize many devices. Results are independent of each other.
    pub fn normalize_fleet(&self, raws: &[Value]) -> Vec<Result<CanonicalDevice>> {
        let now = Utc::now();
        raws.iter().map(|raw| self.normalize_at(raw, None, now)).collect()
    }
}

/// Some API responses wrap the record: `{"device": {...}}`.
fn unwrap_envelope(raw: &Value) -> Result<&Value> {
    if !raw.is_object() {
        return Err(FleetError::NoDeviceRecord(json_kind(raw)));
    }
    let has_identifier = fields::DEVICE_ID.resolve(raw).is_some() || fields::SERIAL.resolve(raw).is_some();
    match raw.get("device") {
        Some(inner) if !has_identifier && inner.is_object() => Ok(inner),
        _ => Ok(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    struct Fixed;

    impl RelativeTimeFormatter for Fixed {
        fn format(&self, _then: DateTime<Utc>, _now: DateTime<Utc>) -> String {
            "a while ago".to_string()
        }
    }

    #[test]
    fn test_non_object_is_fatal() {
        let n = Normalizer::default();
        assert!(matches!(n.normalize_at(&Value::Null, None, now()), Err(FleetError::NoDeviceRecord("null"))));
        assert!(matches!(n.normalize_at(&json!([1]), None, now()), Err(FleetError::NoDeviceRecord("array"))));
    }

    #[test]
    fn test_identifiers() {
        let n = Normalizer::default();
        let d = n.normalize_at(&json!({"serialNumber": "C02X"}), None, now()).unwrap();
        assert_eq!(d.device_id, "C02X");
        assert_eq!(d.serial_number, "C02X");

        let d = n
            .normalize_at(&json!({"modules": {"hardware": {"serialNumber": "5CG1"}}, "deviceId": "abc"}), None, now())
            .unwrap();
        assert_eq!(d.serial_number, "5CG1");
        assert_eq!(d.device_id, "abc");

        let err = n.normalize_at(&json!({"lastSeen": "2024-06-01T00:00:00Z"}), None, now()).unwrap_err();
        assert!(matches!(err, FleetError::MissingIdentifiers));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_envelope_and_custom_formatter() {
        let n = Normalizer::default().with_formatter(Fixed);
        let d = n
            .normalize_at(&json!({"success": true, "device": {"serialNumber": "S1", "lastSeen": "2024-06-01T11:00:00Z"}}), None, now())
            .unwrap();
        assert_eq!(d.serial_number, "S1");
        assert_eq!(d.status, DeviceStatus::Active);
        assert_eq!(d.last_seen_label, "a while ago");
    }

    #[test]
    fn test_upstream_status_wins() {
        let n = Normalizer::default();
        let d = n
            .normalize_at(&json!({"serialNumber": "S", "status": "Error", "lastSeen": "2024-06-01T11:00:00Z"}), None, now())
            .unwrap();
        assert_eq!(d.status, DeviceStatus::Error);

        let d = n
            .normalize_at(&json!({"serialNumber": "S", "status": "online", "lastSeen": "2024-06-01T11:00:00Z"}), None, now())
            .unwrap();
        assert_eq!(d.status, DeviceStatus::Active);
    }

    #[test]
    fn test_unparseable_last_seen() {
        let n = Normalizer::default();
        let d = n
            .normalize_at(&json!({"serialNumber": "S", "lastSeen": "not a date"}), None, now())
            .unwrap();
        assert_eq!(d.last_seen, now());
        assert!(d.last_seen_inferred);
        assert_eq!(d.status, DeviceStatus::Missing);
    }

    #[test]
    fn test_embedded_events_and_limit() {
        let config = NormalizeConfig::from_toml_str("[events]\nmax_events = 1").unwrap();
        let n = Normalizer::new(config);
        let raw = json!({
            "serialNumber": "S",
            "events": [
                {"id": "a", "timestamp": "2024-05-01T00:00:00Z"},
                {"id": "b", "timestamp": "2024-05-02T00:00:00Z"}
            ]
        });
        let d = n.normalize_at(&raw, None, now()).unwrap();
        assert_eq!(d.events.len(), 1);
        assert_eq!(d.events[0].id.as_deref(), Some("b"));

        let explicit = json!([{"id": "x", "timestamp": "2024-05-03T00:00:00Z"}]);
        let d = n.normalize_at(&raw, Some(&explicit), now()).unwrap();
        assert_eq!(d.events[0].id.as_deref(), Some("x"));
    }

    #[test]
    fn test_normalize_fleet_results_are_independent() {
        let n = Normalizer::default();
        let results = n.normalize_fleet(&[json!({"serialNumber": "A"}), json!(null), json!({"serialNumber": "B"})]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().serial_number, "B");
    }
}
