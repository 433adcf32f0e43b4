//! Active endpoint resolution.
//!
//! Collectors rarely say reliably which connection is "the" connection. The
//! rules here are best-effort and each has a name, so a resolved value always
//! records how it was obtained:
//!
//! 1. [`ResolutionRule::Reported`]: the collector's active interface, when it
//!    is a physical adapter we know about.
//! 2. [`ResolutionRule::VpnUnwrapped`]: the reported interface is a VPN tunnel.
//!    VPN status augments, never replaces, the physical connection carrying
//!    it, so the first active IPv4-bearing physical adapter (platform default
//!    type first) becomes primary and the tunnel moves to [`VpnStatus`].
//! 3. [`ResolutionRule::FirstActive`]: nothing usable was reported; take the
//!    first active non-tunnel interface of the merged, sorted list.
//!
//! If no rule matches, the primary connection is absent.
//!
//! Wi-Fi SSIDs get one more heuristic: when the OS redacts the SSID (missing
//! location permission on recent macOS) and exactly one known network exists,
//! that network is assumed to be the associated one. This is a guess.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::address::InterfaceAddress;
use super::interfaces::{InterfaceKind, NetworkInterface};
use crate::reconcile::{value_to_string, Field};
use crate::system::Platform;

mod fields {
    use crate::reconcile::Field;

    pub const ACTIVE_CONNECTION: Field = Field::new(
        "activeConnection",
        &[
            "activeConnection",
            "active_connection",
            "primaryInterface",
            "primary_interface",
            "currentConnection",
            "current_connection",
            "activeInterface",
            "active_interface",
            "defaultInterface",
            "default_interface",
        ],
    );
    pub const CONNECTION_NAME: Field = Field::new(
        "interface",
        &["interface", "interfaceName", "interface_name", "name", "InterfaceAlias", "device"],
    );
    pub const CONNECTION_KIND: Field = Field::new(
        "type",
        &["type", "kind", "connectionType", "connection_type", "interfaceType", "hardwarePort"],
    );
    pub const CONNECTION_IP: Field = Field::new(
        "ipAddress",
        &["ipAddress", "ip_address", "ip", "IPv4Address", "address"],
    );
    pub const CONNECTION_GATEWAY: Field = Field::new(
        "gateway",
        &["gateway", "defaultGateway", "default_gateway", "router"],
    );

    pub const VPN: Field = Field::new(
        "vpn",
        &["vpn", "vpnConnections", "vpn_connections", "vpnStatus", "vpn_status", "VpnConnections"],
    );
    pub const VPN_NAME: Field = Field::new(
        "name",
        &["name", "Name", "displayName", "serviceName", "service_name", "connectionName"],
    );
    pub const VPN_ACTIVE: Field = Field::new(
        "isActive",
        &["isActive", "is_active", "connected", "isConnected", "ConnectionStatus", "status", "state"],
    );
    pub const VPN_SERVER: Field = Field::new(
        "server",
        &["server", "serverAddress", "ServerAddress", "server_address", "remoteAddress"],
    );
    pub const VPN_TUNNEL: Field = Field::new(
        "tunnelInterface",
        &["tunnelInterface", "tunnel_interface", "interface"],
    );

    pub const WIFI: Field = Field::new(
        "wifi",
        &["wifi", "wireless", "wifiInfo", "wifi_info", "airport", "currentWifi", "current_wifi"],
    );
    pub const SSID: Field = Field::new(
        "ssid",
        &["ssid", "SSID", "currentSsid", "current_ssid", "networkName", "network_name"],
    );
    pub const BSSID: Field = Field::new("bssid", &["bssid", "BSSID"]);
    pub const RSSI: Field = Field::new("rssi", &["rssi", "RSSI", "signalStrength", "signal_strength", "Signal"]);
    pub const CHANNEL: Field = Field::new("channel", &["channel", "Channel"]);
    pub const SECURITY: Field = Field::new(
        "security",
        &["security", "securityType", "security_type", "Authentication", "authentication"],
    );
    pub const KNOWN_NETWORKS: Field = Field::new(
        "knownNetworks",
        &[
            "knownNetworks",
            "known_networks",
            "preferredNetworks",
            "preferred_networks",
            "savedNetworks",
            "saved_networks",
        ],
    );
}

/// Which rule produced the primary connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionRule {
    Reported,
    VpnUnwrapped,
    FirstActive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveConnection {
    pub interface: String,
    pub kind: InterfaceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    pub resolved_by: ResolutionRule,
    /// Tunnel the collector reported as active, when it was unwrapped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpn_tunnel: Option<String>,
}

impl ActiveConnection {
    fn from_interface(iface: &NetworkInterface, rule: ResolutionRule) -> Self {
        Self {
            interface: iface.name.clone(),
            kind: iface.kind,
            ip_address: iface.ip_address.clone(),
            mac_address: iface.mac_address.clone(),
            gateway: iface.gateway.clone(),
            resolved_by: rule,
            vpn_tunnel: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VpnStatus {
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel_interface: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    /// SSID was redacted by the OS and guessed from the known-network list.
    pub ssid_inferred: bool,
    pub ssid_redacted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bssid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rssi: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(default)]
    pub known_networks: Vec<String>,
}

/// What the collector claims is the active connection.
#[derive(Debug, Clone, Default, PartialEq)]
struct ReportedConnection {
    interface: Option<String>,
    kind_hint: Option<String>,
    ip_address: Option<String>,
    gateway: Option<String>,
}

fn reported_connection(network: &Value) -> Option<ReportedConnection> {
    match fields::ACTIVE_CONNECTION.resolve(network)? {
        Value::Object(_) => {
            let record = fields::ACTIVE_CONNECTION.object(network)?;
            Some(ReportedConnection {
                interface: fields::CONNECTION_NAME.string(record),
                kind_hint: fields::CONNECTION_KIND.string(record),
                ip_address: fields::CONNECTION_IP.string(record),
                gateway: fields::CONNECTION_GATEWAY.string(record),
            })
        }
        other => value_to_string(other).map(|name| ReportedConnection {
            interface: Some(name),
            ..Default::default()
        }),
    }
}

/// Whether a reported interface is a VPN tunnel pseudo-interface.
pub fn is_vpn_tunnel(name: &str, kind_hint: Option<&str>) -> bool {
    InterfaceKind::classify(name, kind_hint) == InterfaceKind::Tunnel
}

/// Resolve the primary physical connection.
///
/// `physical` is the merged, filtered and sorted interface list.
pub fn resolve_primary(
    network: &Value,
    physical: &[NetworkInterface],
    platform: Platform,
) -> Option<ActiveConnection> {
    if let Some(reported) = reported_connection(network) {
        if let Some(name) = reported.interface.as_deref() {
            let listed = physical.iter().find(|i| i.name == name);
            let tunnel = is_vpn_tunnel(name, reported.kind_hint.as_deref())
                || listed.is_some_and(|i| i.kind == InterfaceKind::Tunnel);
            if tunnel {
                if let Some(carrier) = physical_carrier(physical, platform) {
                    debug!(tunnel = name, carrier = %carrier.name, "unwrapped VPN tunnel to physical adapter");
                    let mut conn = ActiveConnection::from_interface(carrier, ResolutionRule::VpnUnwrapped);
                    conn.vpn_tunnel = Some(name.to_string());
                    return Some(conn);
                }
                debug!(tunnel = name, "reported tunnel has no physical carrier");
            } else if let Some(iface) = listed {
                let mut conn = ActiveConnection::from_interface(iface, ResolutionRule::Reported);
                conn.gateway = conn.gateway.or(reported.gateway.clone());
                return Some(conn);
            } else if let Some(conn) = reported_only(name, &reported) {
                return Some(conn);
            }
        }
    }

    physical
        .iter()
        .find(|iface| iface.is_active && iface.kind != InterfaceKind::Tunnel)
        .map(|iface| ActiveConnection::from_interface(iface, ResolutionRule::FirstActive))
}

/// A reported connection whose interface never appeared in the interface list
/// still counts when it carries a usable address of its own.
fn reported_only(name: &str, reported: &ReportedConnection) -> Option<ActiveConnection> {
    let addr = reported
        .ip_address
        .as_deref()
        .and_then(|ip| InterfaceAddress::parse(ip, None))
        .filter(|a| !a.is_loopback())?;
    let kind = InterfaceKind::classify(name, reported.kind_hint.as_deref());
    if kind == InterfaceKind::Virtual || kind == InterfaceKind::Loopback {
        return None;
    }
    Some(ActiveConnection {
        interface: name.to_string(),
        kind,
        ip_address: Some(addr.address),
        mac_address: None,
        gateway: reported.gateway.clone(),
        resolved_by: ResolutionRule::Reported,
        vpn_tunnel: None,
    })
}

/// First active, non-tunnel, IPv4-bearing adapter; platform default type first.
fn physical_carrier(physical: &[NetworkInterface], platform: Platform) -> Option<&NetworkInterface> {
    let candidates = || {
        physical.iter().filter(|iface| {
            iface.is_active
                && iface.has_routable_ipv4()
                && !matches!(iface.kind, InterfaceKind::Tunnel | InterfaceKind::Loopback)
        })
    };
    platform
        .default_interface_kind()
        .and_then(|preferred| candidates().find(|iface| iface.kind == preferred))
        .or_else(|| candidates().next())
}

/// VPN status from explicit VPN records and from an unwrapped tunnel.
pub fn resolve_vpn(network: &Value, primary: Option<&ActiveConnection>) -> VpnStatus {
    let records: Vec<&Value> = match fields::VPN.resolve(network) {
        Some(Value::Array(_)) => fields::VPN.records(network),
        Some(record @ Value::Object(_)) => vec![record],
        _ => Vec::new(),
    };

    let active = records
        .iter()
        .find(|r| fields::VPN_ACTIVE.bool(r).unwrap_or(false))
        .copied();
    let chosen = active.or_else(|| records.first().copied());

    let mut status = VpnStatus {
        is_active: active.is_some(),
        name: chosen.and_then(|r| fields::VPN_NAME.string(r)),
        server: chosen.and_then(|r| fields::VPN_SERVER.string(r)),
        tunnel_interface: chosen.and_then(|r| fields::VPN_TUNNEL.string(r)),
    };

    if let Some(tunnel) = primary.and_then(|p| p.vpn_tunnel.as_ref()) {
        status.is_active = true;
        status.tunnel_interface = Some(tunnel.clone());
    }
    status
}

const REDACTED_SSIDS: &[&str] = &["redacted", "ssid redacted", "private", "hidden ssid"];

/// Whether an SSID is a privacy placeholder rather than a network name.
pub fn is_redacted_ssid(ssid: &str) -> bool {
    let normalized = ssid
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_ascii_lowercase();
    REDACTED_SSIDS.contains(&normalized.as_str())
}

pub fn resolve_wifi(network: &Value) -> WifiStatus {
    let wifi = fields::WIFI.object(network);
    let scope = |field: &Field| -> Option<String> {
        wifi.and_then(|w| field.string(w)).or_else(|| field.string(network))
    };

    let mut known = known_networks(wifi.unwrap_or(network));
    if known.is_empty() && wifi.is_some() {
        known = known_networks(network);
    }

    let mut status = WifiStatus {
        bssid: scope(&fields::BSSID),
        rssi: wifi
            .and_then(|w| fields::RSSI.i64(w))
            .or_else(|| fields::RSSI.i64(network)),
        channel: scope(&fields::CHANNEL),
        security: scope(&fields::SECURITY),
        ..Default::default()
    };

    match scope(&fields::SSID) {
        Some(ssid) if is_redacted_ssid(&ssid) => {
            status.ssid_redacted = true;
            if let [only] = known.as_slice() {
                debug!(ssid = %only, "SSID redacted, assuming the single known network");
                status.ssid = Some(only.clone());
                status.ssid_inferred = true;
            }
        }
        other => status.ssid = other,
    }
    status.known_networks = known;
    status
}

fn known_networks(scope: &Value) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let Some(Value::Array(items)) = fields::KNOWN_NETWORKS.resolve(scope) else {
        return out;
    };
    for item in items {
        let name = match item {
            Value::Object(_) => fields::SSID.string(item).or_else(|| fields::VPN_NAME.string(item)),
            other => value_to_string(other),
        };
        if let Some(name) = name.filter(|n| !is_redacted_ssid(n)) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::address::VirtualSignatures;
    use crate::network::interfaces::{merge_interfaces, physical_interfaces, RawInterface};
    use serde_json::json;

    fn interfaces(records: Value) -> Vec<NetworkInterface> {
        let raw = records
            .as_array()
            .unwrap()
            .iter()
            .filter_map(RawInterface::from_value)
            .collect();
        physical_interfaces(&merge_interfaces(raw), &VirtualSignatures::default())
    }

    #[test]
    fn test_reported_physical_interface() {
        let list = interfaces(json!([
            {"name": "en0", "isUp": true, "ip": "192.168.1.10", "type": "wifi"},
            {"name": "en7", "isUp": true, "ip": "10.0.0.4", "type": "ethernet"}
        ]));
        let network = json!({"primaryInterface": "en7"});
        let primary = resolve_primary(&network, &list, Platform::Macos).unwrap();
        assert_eq!(primary.interface, "en7");
        assert_eq!(primary.resolved_by, ResolutionRule::Reported);
        assert_eq!(primary.ip_address.as_deref(), Some("10.0.0.4"));
    }

    #[test]
    fn heuristic_vpn_tunnel_is_unwrapped_to_platform_default() {
        let list = interfaces(json!([
            {"name": "en7", "isUp": true, "ip": "10.0.0.4", "type": "ethernet"},
            {"name": "en0", "isUp": true, "ip": "192.168.1.10", "type": "wifi"},
            {"name": "utun4", "isUp": true, "ip": "100.64.0.2"}
        ]));
        let network = json!({
            "activeConnection": {"interface": "utun4", "type": "VPN"},
            "vpn": {"name": "Corp VPN", "status": "connected"}
        });

        let primary = resolve_primary(&network, &list, Platform::Macos).unwrap();
        assert_eq!(primary.interface, "en0");
        assert_eq!(primary.resolved_by, ResolutionRule::VpnUnwrapped);
        assert_eq!(primary.vpn_tunnel.as_deref(), Some("utun4"));

        let vpn = resolve_vpn(&network, Some(&primary));
        assert!(vpn.is_active);
        assert_eq!(vpn.name.as_deref(), Some("Corp VPN"));
        assert_eq!(vpn.tunnel_interface.as_deref(), Some("utun4"));

        let windows = resolve_primary(&network, &list, Platform::Windows).unwrap();
        assert_eq!(windows.interface, "en7");
    }

    #[test]
    fn heuristic_tunnel_adapter_with_friendly_name_is_unwrapped() {
        let list = interfaces(json!([
            {"InterfaceAlias": "Corp VPN", "InterfaceDescription": "WireGuard Tunnel", "Status": "Up", "IPv4Address": "10.8.0.2"},
            {"InterfaceAlias": "Ethernet", "InterfaceDescription": "Intel(R) Ethernet Connection I219-LM", "Status": "Up", "IPv4Address": "192.168.1.20"}
        ]));
        let vpn_adapter = list.iter().find(|i| i.name == "Corp VPN").unwrap();
        assert_eq!(vpn_adapter.kind, InterfaceKind::Tunnel);
        let network = json!({"activeConnection": {"interface": "Corp VPN"}});

        let primary = resolve_primary(&network, &list, Platform::Windows).unwrap();
        assert_eq!(primary.interface, "Ethernet");
        assert_eq!(primary.resolved_by, ResolutionRule::VpnUnwrapped);
        assert_eq!(primary.vpn_tunnel.as_deref(), Some("Corp VPN"));
        assert!(resolve_vpn(&network, Some(&primary)).is_active);
    }

    #[test]
    fn test_fallback_to_first_active_non_tunnel() {
        let list = interfaces(json!([
            {"name": "utun0", "isUp": true, "ip": "100.64.0.2"},
            {"name": "Ethernet", "Status": "Disconnected"},
            {"name": "Wi-Fi", "Status": "Up", "IPAddress": "192.168.0.20"}
        ]));
        let primary = resolve_primary(&json!({}), &list, Platform::Windows).unwrap();
        assert_eq!(primary.interface, "Wi-Fi");
        assert_eq!(primary.resolved_by, ResolutionRule::FirstActive);
    }

    #[test]
    fn test_nothing_active_is_absent() {
        let list = interfaces(json!([{"name": "en0", "isUp": false}]));
        assert!(resolve_primary(&json!({}), &list, Platform::Macos).is_none());
        assert!(resolve_primary(&json!({"activeInterface": "vmnet1"}), &list, Platform::Macos).is_none());
    }

    #[test]
    fn test_reported_connection_outside_interface_list() {
        let network = json!({"currentConnection": {"name": "Ethernet 4", "ipAddress": "10.9.8.7", "gateway": "10.9.8.1"}});
        let primary = resolve_primary(&network, &[], Platform::Windows).unwrap();
        assert_eq!(primary.interface, "Ethernet 4");
        assert_eq!(primary.kind, InterfaceKind::Ethernet);
        assert_eq!(primary.gateway.as_deref(), Some("10.9.8.1"));
    }

    #[test]
    fn test_vpn_list_without_active_entry() {
        let network = json!({"vpnConnections": [{"name": "Backup", "connected": false}]});
        let vpn = resolve_vpn(&network, None);
        assert!(!vpn.is_active);
        assert_eq!(vpn.name.as_deref(), Some("Backup"));
        assert_eq!(resolve_vpn(&json!({}), None), VpnStatus::default());
    }

    #[test]
    fn test_wifi_plain_ssid() {
        let wifi = resolve_wifi(&json!({"wifi": {"ssid": "Office", "rssi": -55, "channel": 36}}));
        assert_eq!(wifi.ssid.as_deref(), Some("Office"));
        assert!(!wifi.ssid_inferred);
        assert_eq!(wifi.rssi, Some(-55));
        assert_eq!(wifi.channel.as_deref(), Some("36"));
    }

    #[test]
    fn heuristic_redacted_ssid_uses_single_known_network() {
        let wifi = resolve_wifi(&json!({
            "wifi": {"ssid": "<redacted>", "knownNetworks": [{"ssid": "HomeNet"}]}
        }));
        assert_eq!(wifi.ssid.as_deref(), Some("HomeNet"));
        assert!(wifi.ssid_inferred);
        assert!(wifi.ssid_redacted);
    }

    #[test]
    fn heuristic_redacted_ssid_with_many_known_networks_stays_absent() {
        let wifi = resolve_wifi(&json!({
            "ssid": "<SSID Redacted>",
            "known_networks": ["HomeNet", "Office"]
        }));
        assert_eq!(wifi.ssid, None);
        assert!(wifi.ssid_redacted);
        assert!(!wifi.ssid_inferred);
        assert_eq!(wifi.known_networks, vec!["HomeNet", "Office"]);
    }
}
