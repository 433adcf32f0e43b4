//! Device status derivation at the window boundaries.
//!
//! Status is a pure function of `now - lastSeen`: under 24h active, under
//! 7d stale, otherwise missing.

use chrono::{DateTime, Duration, Utc};
use fleet_shared::config::StatusThresholds;
use fleet_shared::timestamp::to_iso;
use fleet_shared::{derive_status, DeviceStatus, NormalizeConfig, Normalizer};
use serde_json::json;

fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-10T08:30:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn status_after(age: Duration) -> DeviceStatus {
    derive_status(Some(now() - age), now(), &StatusThresholds::default())
}

// ============================================================================
// Boundaries
// ============================================================================

#[test]
fn test_boundary_23h59m_is_active() {
    assert_eq!(status_after(Duration::hours(23) + Duration::minutes(59)), DeviceStatus::Active);
}

#[test]
fn test_boundary_24h_is_stale() {
    assert_eq!(status_after(Duration::hours(24)), DeviceStatus::Stale);
}

#[test]
fn test_boundary_6d23h_is_stale() {
    assert_eq!(status_after(Duration::days(6) + Duration::hours(23)), DeviceStatus::Stale);
}

#[test]
fn test_boundary_7d_is_missing() {
    assert_eq!(status_after(Duration::days(7)), DeviceStatus::Missing);
}

#[test]
fn test_status_depends_only_on_age() {
    let thresholds = StatusThresholds::default();
    let age = Duration::hours(30);
    let other_now = now() + Duration::days(400);
    assert_eq!(
        derive_status(Some(now() - age), now(), &thresholds),
        derive_status(Some(other_now - age), other_now, &thresholds),
    );
}

// ============================================================================
// Through the normalizer
// ============================================================================

#[test]
fn test_normalized_status_from_iso_last_seen() {
    let normalizer = Normalizer::default();
    let cases = [
        (Duration::hours(23) + Duration::minutes(59), DeviceStatus::Active),
        (Duration::hours(24), DeviceStatus::Stale),
        (Duration::days(6) + Duration::hours(23), DeviceStatus::Stale),
        (Duration::days(7), DeviceStatus::Missing),
    ];
    for (age, expected) in cases {
        let raw = json!({"serialNumber": "C02ABC", "lastSeen": to_iso(&(now() - age))});
        let device = normalizer.normalize_at(&raw, None, now()).unwrap();
        assert_eq!(device.status, expected, "age {age}");
        assert!(!device.last_seen_inferred);
    }
}

#[test]
fn test_missing_last_seen_is_missing_with_fresh_timestamp() {
    let before = Utc::now();
    let device = Normalizer::default()
        .normalize(&json!({"deviceId": "7f3c", "serialNumber": "C02ABC"}), None)
        .unwrap();
    let after = Utc::now();

    assert_eq!(device.status, DeviceStatus::Missing);
    assert!(device.last_seen_inferred);
    assert!(device.last_seen >= before && device.last_seen <= after);
}

#[test]
fn test_configured_windows() {
    let config = NormalizeConfig::from_toml_str("[status]\nactive_hours = 2\nstale_days = 1\n").unwrap();
    let normalizer = Normalizer::new(config);
    let raw = json!({"serialNumber": "S", "lastSeen": to_iso(&(now() - Duration::hours(3)))});
    let device = normalizer.normalize_at(&raw, None, now()).unwrap();
    assert_eq!(device.status, DeviceStatus::Stale);
}
