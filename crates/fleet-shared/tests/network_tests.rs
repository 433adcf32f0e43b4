//! Interface merging, filtering and primary connection resolution.

use fleet_shared::network::{
    merge_interfaces, normalize_interfaces, normalize_network, InterfaceKind, NetworkInterface,
    RawInterface, ResolutionRule, VirtualSignatures,
};
use fleet_shared::{Normalizer, Platform};
use serde_json::{json, Value};

fn merge_values(records: &[Value]) -> Vec<NetworkInterface> {
    let refs: Vec<&Value> = records.iter().collect();
    normalize_interfaces(&refs, &VirtualSignatures::default())
}

// ============================================================================
// Merge
// ============================================================================

#[test]
fn test_en0_down_then_up_merges_to_active() {
    let records = [
        json!({"name": "en0", "isUp": 0, "addresses": []}),
        json!({"name": "en0", "isUp": 1, "addresses": [{"address": "192.168.1.10", "family": "IPv4"}]}),
    ];
    let merged = merge_values(&records);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].name, "en0");
    assert!(merged[0].is_active);
    assert_eq!(merged[0].ip_address.as_deref(), Some("192.168.1.10"));
}

#[test]
fn test_en0_scenario_through_normalizer() {
    let raw = json!({
        "serialNumber": "C02XK1",
        "network": {"interfaces": [
            {"name": "en0", "isUp": 0, "addresses": []},
            {"name": "en0", "isUp": 1, "addresses": [{"address": "192.168.1.10", "family": "IPv4"}]}
        ]}
    });
    let device = Normalizer::default().normalize(&raw, None).unwrap();
    let en0 = device
        .network
        .interfaces
        .iter()
        .find(|i| i.name == "en0")
        .unwrap();
    assert!(en0.is_active);
    assert_eq!(en0.ip_address.as_deref(), Some("192.168.1.10"));
    assert_eq!(device.primary_ip(), Some("192.168.1.10"));
}

#[test]
fn test_up_and_down_merge_is_up_in_either_order() {
    for records in [
        [json!({"name": "eth0", "status": "Up"}), json!({"name": "eth0", "status": "Down"})],
        [json!({"name": "eth0", "status": "Down"}), json!({"name": "eth0", "status": "Up"})],
    ] {
        let merged = merge_values(&records);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].is_active);
    }
}

#[test]
fn test_merge_is_idempotent() {
    let records = [
        json!({"name": "Wi-Fi", "type": "Wireless", "macAddress": "A4-83-E7-12-34-56", "ipAddress": "10.0.0.23"}),
        json!({"name": "Wi-Fi", "ipAddress": "fe80::1c2b:3d4e:5f60:7a8b%12"}),
        json!({"name": "Ethernet", "status": "Disconnected", "dnsServers": ["10.0.0.1"]}),
        json!({"name": "Ethernet", "ipv6": "2001:db8::42"}),
    ];
    let once = merge_values(&records);

    let reparsed: Vec<RawInterface> = once.iter().map(RawInterface::from).collect();
    assert_eq!(merge_interfaces(reparsed), once);

    let serialized: Vec<Value> = once.iter().map(|i| serde_json::to_value(i).unwrap()).collect();
    assert_eq!(merge_values(&serialized), once);
}

#[test]
fn test_addresses_union_in_first_seen_order() {
    let records = [
        json!({"name": "en0", "ipAddress": "192.168.1.10"}),
        json!({"name": "en0", "ipAddress": "fe80::1"}),
        json!({"name": "en0", "ipAddress": "192.168.1.10"}),
    ];
    let merged = merge_values(&records);
    let addresses: Vec<&str> = merged[0].addresses.iter().map(|a| a.address.as_str()).collect();
    assert_eq!(addresses, vec!["192.168.1.10", "fe80::1"]);
}

// ============================================================================
// Filtering
// ============================================================================

#[test]
fn test_loopback_and_virtual_adapters_are_dropped() {
    let records = [
        json!({"name": "lo0", "ipAddress": "127.0.0.1", "isUp": true}),
        json!({"name": "vEthernet (WSL)", "ipAddress": "172.25.96.1", "isUp": true}),
        json!({"name": "Ethernet 2", "macAddress": "00:50:56:c0:00:08", "isUp": true}),
        json!({"name": "en0", "ipAddress": "192.168.1.10", "isUp": true}),
    ];
    let names: Vec<String> = merge_values(&records).into_iter().map(|i| i.name).collect();
    assert_eq!(names, vec!["en0".to_string()]);
}

#[test]
fn test_network_module_as_bare_array() {
    let module = json!([{"name": "Ethernet", "type": "Ethernet", "ipAddress": "10.1.2.3", "isUp": true}]);
    let summary = normalize_network(Some(&module), Platform::Windows, &VirtualSignatures::default());
    assert_eq!(summary.interfaces.len(), 1);
    assert_eq!(summary.interfaces[0].kind, InterfaceKind::Ethernet);
    let primary = summary.primary.unwrap();
    assert_eq!(primary.interface, "Ethernet");
    assert_eq!(primary.resolved_by, ResolutionRule::FirstActive);
}

#[test]
fn test_missing_network_module_is_empty_summary() {
    let summary = normalize_network(None, Platform::Macos, &VirtualSignatures::default());
    assert!(summary.interfaces.is_empty());
    assert!(summary.primary.is_none());
    assert_eq!(summary.primary_ip(), None);
}
