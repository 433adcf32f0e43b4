//! Interface deduplication and merging.
//!
//! One collector reports an interface once per bound address, so `en0` may
//! show up three times with one address each and disagreeing "up" flags.
//! Records are grouped by interface name and folded into a single
//! [`NetworkInterface`]:
//!
//! - addresses are unioned in first-seen order
//! - the interface is up if any record says so
//! - it is active if up or if it holds a routable IPv4 address
//!
//! Merging is idempotent: feeding merged output back in yields the same list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use super::address::{display_address, normalize_mac, InterfaceAddress, VirtualSignatures};
use crate::reconcile::{is_absent, value_to_string, Field};

mod fields {
    use crate::reconcile::Field;

    pub const NAME: Field = Field::new(
        "name",
        &[
            "name",
            "Name",
            "interface",
            "interfaceName",
            "interface_name",
            "InterfaceAlias",
            "ifName",
            "device",
        ],
    );
    pub const DESCRIPTION: Field = Field::new(
        "description",
        &["description", "Description", "InterfaceDescription", "displayName", "hardwarePort", "hardware_port"],
    );
    pub const KIND: Field = Field::new(
        "kind",
        &[
            "kind",
            "type",
            "Type",
            "interfaceType",
            "interface_type",
            "MediaType",
            "mediaType",
            "hardwarePort",
            "hardware_port",
            "InterfaceDescription",
        ],
    );
    pub const MAC: Field = Field::new(
        "macAddress",
        &["macAddress", "mac_address", "MacAddress", "mac", "ether", "hardwareAddress", "PhysicalAddress"],
    );
    pub const IS_UP: Field = Field::new(
        "isUp",
        &[
            "isUp",
            "is_up",
            "IsUp",
            "up",
            "isActive",
            "is_active",
            "active",
            "status",
            "Status",
            "OperationalStatus",
            "operstate",
            "state",
            "connected",
        ],
    );
    pub const GATEWAY: Field = Field::new(
        "gateway",
        &["gateway", "Gateway", "defaultGateway", "default_gateway", "DefaultGateway", "router"],
    );
    pub const DNS: Field = Field::new(
        "dnsServers",
        &["dnsServers", "dns_servers", "DNSServers", "DnsServer", "dns"],
    );
    pub const MTU: Field = Field::new("mtu", &["mtu", "MTU", "Mtu", "NlMtu"]);
    pub const LINK_SPEED: Field = Field::new(
        "linkSpeed",
        &["linkSpeed", "link_speed", "LinkSpeed", "speed", "Speed"],
    );
    pub const NETMASK: Field = Field::new(
        "netmask",
        &["netmask", "Netmask", "subnetMask", "subnet_mask", "PrefixLength", "prefixLength", "prefix_length"],
    );

    /// Every place an address may hide. All of them are read, not just the first.
    pub const ADDRESS_PATHS: &[&str] = &[
        "addresses",
        "ipAddresses",
        "ip_addresses",
        "ipAddress",
        "ip_address",
        "IPAddress",
        "IPv4Address",
        "ipv4",
        "ipv4Addresses",
        "IPv6Address",
        "ipv6",
        "ipv6Addresses",
        "address",
        "ip",
    ];

    pub const ADDRESS_IN_RECORD: Field = Field::new(
        "address",
        &["address", "Address", "ip", "ipAddress", "IPAddress", "addr"],
    );
}

/// Adapter category used for sorting and primary-connection selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceKind {
    Wireless,
    Ethernet,
    Tunnel,
    Cellular,
    Bridge,
    Loopback,
    Virtual,
    #[default]
    Other,
}

impl InterfaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceKind::Wireless => "wireless",
            InterfaceKind::Ethernet => "ethernet",
            InterfaceKind::Tunnel => "tunnel",
            InterfaceKind::Cellular => "cellular",
            InterfaceKind::Bridge => "bridge",
            InterfaceKind::Loopback => "loopback",
            InterfaceKind::Virtual => "virtual",
            InterfaceKind::Other => "other",
        }
    }

    /// Classify from a collector type hint, falling back to the name.
    pub fn classify(name: &str, hint: Option<&str>) -> Self {
        if let Some(kind) = hint.and_then(Self::from_hint) {
            return kind;
        }
        Self::from_name(name)
    }

    fn from_hint(hint: &str) -> Option<Self> {
        let h = hint.trim().to_ascii_lowercase();
        let exact = match h.as_str() {
            "wireless" => Some(InterfaceKind::Wireless),
            "ethernet" => Some(InterfaceKind::Ethernet),
            "tunnel" => Some(InterfaceKind::Tunnel),
            "cellular" => Some(InterfaceKind::Cellular),
            "bridge" => Some(InterfaceKind::Bridge),
            "loopback" => Some(InterfaceKind::Loopback),
            "virtual" => Some(InterfaceKind::Virtual),
            _ => None,
        };
        if exact.is_some() {
            return exact;
        }

        let has = |needles: &[&str]| needles.iter().any(|n| h.contains(n));
        if has(&["loopback"]) {
            Some(InterfaceKind::Loopback)
        } else if has(&["vpn", "tunnel", "ipsec", "wireguard", "ppp", "tap-windows", "wintun"]) {
            Some(InterfaceKind::Tunnel)
        } else if has(&["hyper-v", "vmware", "virtualbox", "virtual", "docker", "vethernet"]) {
            Some(InterfaceKind::Virtual)
        } else if has(&["wi-fi", "wifi", "wireless", "802.11", "airport", "wlan"]) {
            Some(InterfaceKind::Wireless)
        } else if has(&["bridge"]) {
            Some(InterfaceKind::Bridge)
        } else if has(&["cellular", "wwan", "mobile broadband"]) {
            Some(InterfaceKind::Cellular)
        } else if has(&["ethernet", "802.3", "wired", "gigabit", "usb 10/100"]) {
            Some(InterfaceKind::Ethernet)
        } else {
            None
        }
    }

    fn from_name(name: &str) -> Self {
        let n = name.trim().to_ascii_lowercase();
        let starts = |prefixes: &[&str]| prefixes.iter().any(|p| n.starts_with(p));
        let en_digit = n.starts_with("en") && n[2..].chars().next().is_some_and(|c| c.is_ascii_digit());

        if n == "lo" || starts(&["lo0", "loopback"]) {
            InterfaceKind::Loopback
        } else if starts(&["utun", "ipsec", "ppp", "tun", "tap", "wg", "gif", "stf"]) {
            InterfaceKind::Tunnel
        } else if starts(&["vboxnet", "vmnet", "veth", "docker", "vethernet", "virbr", "awdl", "llw", "anpi", "bridge"]) {
            if n.starts_with("bridge") {
                InterfaceKind::Bridge
            } else {
                InterfaceKind::Virtual
            }
        } else if starts(&["wlan", "wlp", "wl", "wi-fi", "wifi", "wireless"]) {
            InterfaceKind::Wireless
        } else if starts(&["wwan", "pdp_ip", "cellular"]) {
            InterfaceKind::Cellular
        } else if en_digit || starts(&["eth", "enp", "eno", "ens", "enx", "ethernet"]) {
            InterfaceKind::Ethernet
        } else {
            InterfaceKind::Other
        }
    }
}

/// One raw interface record after field reconciliation, before merging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawInterface {
    pub name: String,
    pub description: Option<String>,
    pub kind_hint: Option<String>,
    pub mac_address: Option<String>,
    pub is_up: bool,
    pub addresses: Vec<InterfaceAddress>,
    pub gateway: Option<String>,
    pub dns_servers: Vec<String>,
    pub mtu: Option<u64>,
    pub link_speed: Option<String>,
}

impl RawInterface {
    /// Reconcile one raw record. Records without a name are unusable.
    pub fn from_value(record: &Value) -> Option<Self> {
        let name = fields::NAME.string(record)?;
        Some(Self {
            description: fields::DESCRIPTION.string(record),
            kind_hint: fields::KIND.string(record),
            mac_address: fields::MAC
                .string(record)
                .map(|mac| normalize_mac(&mac).unwrap_or(mac)),
            is_up: fields::IS_UP.bool(record).unwrap_or(false),
            addresses: collect_addresses(record),
            gateway: fields::GATEWAY.string(record),
            dns_servers: fields::DNS.strings(record),
            mtu: fields::MTU.u64(record),
            link_speed: fields::LINK_SPEED.string(record),
            name,
        })
    }
}

impl From<&NetworkInterface> for RawInterface {
    fn from(iface: &NetworkInterface) -> Self {
        Self {
            name: iface.name.clone(),
            description: iface.description.clone(),
            kind_hint: Some(iface.kind.as_str().to_string()),
            mac_address: iface.mac_address.clone(),
            is_up: iface.is_active,
            addresses: iface.addresses.clone(),
            gateway: iface.gateway.clone(),
            dns_servers: iface.dns_servers.clone(),
            mtu: iface.mtu,
            link_speed: iface.link_speed.clone(),
        }
    }
}

/// Addresses from every known location in a record: scalar strings,
/// comma-separated strings, string arrays and arrays of address objects.
fn collect_addresses(record: &Value) -> Vec<InterfaceAddress> {
    let record_netmask = fields::NETMASK.string(record);
    let mut out: Vec<InterfaceAddress> = Vec::new();
    let mut push = |addr: Option<InterfaceAddress>| {
        if let Some(addr) = addr {
            if !out.iter().any(|a| a.address == addr.address) {
                out.push(addr);
            }
        }
    };

    for path in fields::ADDRESS_PATHS {
        let Some(value) = record.get(*path).filter(|v| !is_absent(v)) else {
            continue;
        };
        match value {
            Value::String(s) => {
                for part in s.split(',') {
                    push(InterfaceAddress::parse(part, record_netmask.clone()));
                }
            }
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::Object(_) => {
                            let netmask = fields::NETMASK.string(item);
                            push(
                                fields::ADDRESS_IN_RECORD
                                    .string(item)
                                    .and_then(|a| InterfaceAddress::parse(&a, netmask)),
                            );
                        }
                        other => push(
                            value_to_string(other).and_then(|a| InterfaceAddress::parse(&a, None)),
                        ),
                    }
                }
            }
            _ => {}
        }
    }
    out
}

/// A merged interface: one entry per adapter name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub kind: InterfaceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub addresses: Vec<InterfaceAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_servers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_speed: Option<String>,
}

impl NetworkInterface {
    pub fn has_routable_ipv4(&self) -> bool {
        self.addresses.iter().any(InterfaceAddress::is_routable_ipv4)
    }

    /// Loopback by name/type, or every address is a loopback address.
    pub fn is_loopback(&self) -> bool {
        self.kind == InterfaceKind::Loopback
            || (!self.addresses.is_empty() && self.addresses.iter().all(InterfaceAddress::is_loopback))
    }

    /// Hypervisor/container adapter: by type, MAC OUI, or addresses that all
    /// sit in known virtual-network ranges.
    pub fn is_virtual(&self, signatures: &VirtualSignatures) -> bool {
        if self.kind == InterfaceKind::Virtual {
            return true;
        }
        if self
            .mac_address
            .as_deref()
            .is_some_and(|mac| signatures.is_virtual_mac(mac))
        {
            return true;
        }
        let mut ipv4 = self.addresses.iter().filter(|a| a.is_ipv4()).peekable();
        ipv4.peek().is_some() && ipv4.all(|a| signatures.is_virtual_ip(&a.address))
    }
}

/// Group, merge and sort. No filtering happens here.
pub fn merge_interfaces(raw: Vec<RawInterface>) -> Vec<NetworkInterface> {
    let mut order: Vec<RawInterface> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in raw {
        match index.get(&record.name) {
            Some(&i) => absorb(&mut order[i], record),
            None => {
                index.insert(record.name.clone(), order.len());
                order.push(record);
            }
        }
    }

    let mut merged: Vec<NetworkInterface> = order.into_iter().map(finish).collect();
    sort_interfaces(&mut merged);
    merged
}

fn absorb(into: &mut RawInterface, other: RawInterface) {
    into.is_up |= other.is_up;
    for addr in other.addresses {
        if !into.addresses.iter().any(|a| a.address == addr.address) {
            into.addresses.push(addr);
        }
    }
    for dns in other.dns_servers {
        if !into.dns_servers.contains(&dns) {
            into.dns_servers.push(dns);
        }
    }
    into.description = into.description.take().or(other.description);
    into.kind_hint = into.kind_hint.take().or(other.kind_hint);
    into.mac_address = into.mac_address.take().or(other.mac_address);
    into.gateway = into.gateway.take().or(other.gateway);
    into.mtu = into.mtu.or(other.mtu);
    into.link_speed = into.link_speed.take().or(other.link_speed);
}

fn finish(raw: RawInterface) -> NetworkInterface {
    let kind = InterfaceKind::classify(&raw.name, raw.kind_hint.as_deref());
    let is_active = raw.is_up || raw.addresses.iter().any(InterfaceAddress::is_routable_ipv4);
    NetworkInterface {
        ip_address: display_address(&raw.addresses, is_active),
        name: raw.name,
        description: raw.description,
        kind,
        mac_address: raw.mac_address,
        is_active,
        addresses: raw.addresses,
        gateway: raw.gateway,
        dns_servers: raw.dns_servers,
        mtu: raw.mtu,
        link_speed: raw.link_speed,
    }
}

/// Active first, then wireless, then by name.
pub fn sort_interfaces(list: &mut [NetworkInterface]) {
    list.sort_by(|a, b| {
        b.is_active
            .cmp(&a.is_active)
            .then_with(|| {
                (b.kind == InterfaceKind::Wireless).cmp(&(a.kind == InterfaceKind::Wireless))
            })
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Drop loopback and virtual adapters.
pub fn physical_interfaces(
    merged: &[NetworkInterface],
    signatures: &VirtualSignatures,
) -> Vec<NetworkInterface> {
    merged
        .iter()
        .filter(|iface| !iface.is_loopback() && !iface.is_virtual(signatures))
        .cloned()
        .collect()
}

/// Reconcile, merge and filter raw interface records in one go.
pub fn normalize_interfaces(
    records: &[&Value],
    signatures: &VirtualSignatures,
) -> Vec<NetworkInterface> {
    let raw = records.iter().filter_map(|r| RawInterface::from_value(r)).collect();
    physical_interfaces(&merge_interfaces(raw), signatures)
}

/// Raw interface list paths within a network module.
pub const INTERFACE_LIST: Field = Field::new(
    "interfaces",
    &[
        "interfaces",
        "networkInterfaces",
        "network_interfaces",
        "adapters",
        "NetAdapters",
        "interface_details",
    ],
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawInterface {
        RawInterface::from_value(&v).unwrap()
    }

    #[test]
    fn test_classify_by_hint_and_name() {
        assert_eq!(InterfaceKind::classify("en0", Some("Wi-Fi")), InterfaceKind::Wireless);
        assert_eq!(InterfaceKind::classify("en0", None), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::classify("utun3", None), InterfaceKind::Tunnel);
        assert_eq!(InterfaceKind::classify("lo0", None), InterfaceKind::Loopback);
        assert_eq!(
            InterfaceKind::classify("vEthernet (WSL)", Some("Hyper-V Virtual Ethernet Adapter")),
            InterfaceKind::Virtual
        );
        assert_eq!(InterfaceKind::classify("Ethernet 2", None), InterfaceKind::Ethernet);
        assert_eq!(InterfaceKind::classify("bridge0", None), InterfaceKind::Bridge);
        assert_eq!(InterfaceKind::classify("x9", Some("other")), InterfaceKind::Other);
    }

    #[test]
    fn test_from_value_reads_windows_dialect() {
        let iface = raw(json!({
            "InterfaceAlias": "Ethernet",
            "InterfaceDescription": "Intel(R) Ethernet Connection I219-LM",
            "MacAddress": "A4-83-E7-11-22-33",
            "Status": "Up",
            "IPv4Address": "10.0.0.5",
            "IPv6Address": "fe80::a%12",
            "DNSServers": ["10.0.0.1"]
        }));
        assert_eq!(iface.name, "Ethernet");
        assert_eq!(iface.mac_address.as_deref(), Some("a4:83:e7:11:22:33"));
        assert!(iface.is_up);
        assert_eq!(iface.addresses.len(), 2);
        assert_eq!(iface.dns_servers, vec!["10.0.0.1"]);
    }

    #[test]
    fn test_single_record_passes_through() {
        let merged = merge_interfaces(vec![raw(json!({"name": "en1", "isUp": false}))]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].name, "en1");
        assert!(!merged[0].is_active);
        assert!(merged[0].addresses.is_empty());
    }

    #[test]
    fn test_active_without_addresses_is_kept() {
        let merged = merge_interfaces(vec![raw(json!({"name": "en0", "isUp": true}))]);
        let physical = physical_interfaces(&merged, &VirtualSignatures::default());
        assert_eq!(physical.len(), 1);
        assert!(physical[0].is_active);
        assert_eq!(physical[0].ip_address, None);
    }

    #[test]
    fn test_routable_ipv4_implies_active() {
        let merged = merge_interfaces(vec![raw(json!({"name": "en5", "ip": "192.168.1.4"}))]);
        assert!(merged[0].is_active);
    }

    #[test]
    fn test_sort_order() {
        let merged = merge_interfaces(vec![
            raw(json!({"name": "en7", "isUp": false})),
            raw(json!({"name": "en1", "isUp": true, "type": "Ethernet"})),
            raw(json!({"name": "en0", "isUp": true, "hardwarePort": "Wi-Fi"})),
            raw(json!({"name": "en2", "isUp": false, "type": "wifi"})),
        ]);
        let names: Vec<&str> = merged.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["en0", "en1", "en2", "en7"]);
    }

    #[test]
    fn test_virtual_and_loopback_filtered() {
        let merged = merge_interfaces(vec![
            raw(json!({"name": "lo0", "isUp": true, "addresses": ["127.0.0.1"]})),
            raw(json!({"name": "vmnet8", "isUp": true})),
            raw(json!({"name": "Ethernet 3", "isUp": true, "mac": "00:15:5d:01:02:03"})),
            raw(json!({"name": "vboxnet0", "isUp": true, "type": "ethernet", "ip": "192.168.56.1"})),
            raw(json!({"name": "en0", "isUp": true, "ip": "192.168.1.10"})),
        ]);
        let physical = physical_interfaces(&merged, &VirtualSignatures::default());
        let names: Vec<&str> = physical.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["en0"]);
    }
}
