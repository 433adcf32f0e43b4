//! Network module normalization.
//!
//! - `address`: address parsing, display-address ranking, virtual signatures
//! - `interfaces`: per-name merging of raw interface records
//! - `active`: primary connection, VPN and Wi-Fi resolution

pub mod active;
pub mod address;
pub mod interfaces;

pub use active::{
    is_redacted_ssid, resolve_primary, resolve_vpn, resolve_wifi, ActiveConnection,
    ResolutionRule, VpnStatus, WifiStatus,
};
pub use address::{AddressFamily, InterfaceAddress, VirtualSignatures};
pub use interfaces::{
    merge_interfaces, normalize_interfaces, physical_interfaces, InterfaceKind, NetworkInterface,
    RawInterface,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reconcile::Field;
use crate::system::Platform;

const HOSTNAME: Field = Field::new(
    "hostname",
    &["hostname", "hostName", "HostName", "host_name", "dnsHostName", "DNSHostName", "computerName"],
);
const DNS_SERVERS: Field = Field::new(
    "dnsServers",
    &["dnsServers", "dns_servers", "DNSServers", "dns.servers", "dns"],
);

/// Canonical network sub-object. Always present; empty when nothing was reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<NetworkInterface>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<ActiveConnection>,
    #[serde(default)]
    pub vpn: VpnStatus,
    #[serde(default)]
    pub wifi: WifiStatus,
    #[serde(default)]
    pub dns_servers: Vec<String>,
}

impl NetworkSummary {
    /// Display IP of the primary connection.
    pub fn primary_ip(&self) -> Option<&str> {
        self.primary.as_ref().and_then(|p| p.ip_address.as_deref())
    }
}

pub fn normalize_network(
    module: Option<&Value>,
    platform: Platform,
    signatures: &VirtualSignatures,
) -> NetworkSummary {
    let Some(network) = module else {
        return NetworkSummary::default();
    };

    // A bare array is an interface list with nothing around it.
    let records = match network {
        Value::Array(items) => items.iter().filter(|i| i.is_object()).collect(),
        _ => interfaces::INTERFACE_LIST.all_records(network),
    };
    let interfaces = normalize_interfaces(&records, signatures);

    let primary = resolve_primary(network, &interfaces, platform);
    let vpn = resolve_vpn(network, primary.as_ref());
    let wifi = resolve_wifi(network);

    let mut dns_servers = DNS_SERVERS.strings(network);
    for iface in &interfaces {
        for server in &iface.dns_servers {
            if !dns_servers.contains(server) {
                dns_servers.push(server.clone());
            }
        }
    }

    NetworkSummary {
        hostname: HOSTNAME.string(network),
        interfaces,
        primary,
        vpn,
        wifi,
        dns_servers,
    }
}
