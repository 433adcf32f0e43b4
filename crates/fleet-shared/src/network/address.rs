//! Address classification and virtual adapter signatures.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::config::NetworkSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "IPv4")]
    Ipv4,
    #[serde(rename = "IPv6")]
    Ipv6,
}

/// One address bound to an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceAddress {
    pub address: String,
    pub family: AddressFamily,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
}

impl InterfaceAddress {
    /// Parse a raw address, tolerating `%scope` and `/prefix` suffixes.
    ///
    /// The family is taken from the parsed address, not from whatever the
    /// collector claimed.
    pub fn parse(raw: &str, netmask: Option<String>) -> Option<Self> {
        let trimmed = raw.trim();
        let (without_prefix, prefix) = match trimmed.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix.to_string())),
            None => (trimmed, None),
        };
        let bare = without_prefix
            .split('%')
            .next()
            .unwrap_or(without_prefix)
            .trim_matches(|c| c == '[' || c == ']');
        let ip: IpAddr = bare.parse().ok()?;

        Some(Self {
            address: ip.to_string(),
            family: match ip {
                IpAddr::V4(_) => AddressFamily::Ipv4,
                IpAddr::V6(_) => AddressFamily::Ipv6,
            },
            netmask: netmask.or(prefix),
        })
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.address.parse().ok()
    }

    pub fn is_ipv4(&self) -> bool {
        self.family == AddressFamily::Ipv4
    }

    pub fn is_loopback(&self) -> bool {
        self.ip().map(|ip| ip.is_loopback()).unwrap_or(false)
    }

    /// 169.254.0.0/16 or fe80::/10.
    pub fn is_link_local(&self) -> bool {
        match self.ip() {
            Some(IpAddr::V4(v4)) => v4.is_link_local(),
            Some(IpAddr::V6(v6)) => (v6.segments()[0] & 0xffc0) == 0xfe80,
            None => false,
        }
    }

    /// IPv4 that is neither loopback, link-local nor unspecified.
    pub fn is_routable_ipv4(&self) -> bool {
        match self.ip() {
            Some(IpAddr::V4(v4)) => !v4.is_loopback() && !v4.is_link_local() && !v4.is_unspecified(),
            _ => false,
        }
    }
}

/// Pick the address to show for an interface.
///
/// Active interfaces prefer any non-loopback IPv4. Inactive ones prefer
/// non-link-local addresses: a disconnected adapter often still reports a
/// self-assigned link-local address, which says nothing useful.
pub fn display_address(addresses: &[InterfaceAddress], is_active: bool) -> Option<String> {
    let rank = |addr: &InterfaceAddress| -> Option<u8> {
        if addr.is_loopback() {
            return None;
        }
        let link_local = addr.is_link_local();
        Some(match (is_active, addr.is_ipv4(), link_local) {
            (true, true, false) => 0,
            (true, true, true) => 1,
            (true, false, false) => 2,
            (true, false, true) => 3,
            (false, true, false) => 0,
            (false, false, false) => 1,
            (false, true, true) => 2,
            (false, false, true) => 3,
        })
    };

    addresses
        .iter()
        .filter_map(|addr| rank(addr).map(|r| (r, addr)))
        .min_by_key(|(r, _)| *r)
        .map(|(_, addr)| addr.address.clone())
}

/// Hypervisor and container MAC OUIs.
pub const VIRTUAL_MAC_PREFIXES: &[(&str, &str)] = &[
    ("00:05:69", "VMware"),
    ("00:0c:29", "VMware"),
    ("00:1c:14", "VMware"),
    ("00:50:56", "VMware"),
    ("08:00:27", "VirtualBox"),
    ("0a:00:27", "VirtualBox"),
    ("00:15:5d", "Hyper-V"),
    ("00:1c:42", "Parallels"),
    ("00:16:3e", "Xen"),
    ("52:54:00", "QEMU/KVM"),
    ("02:42", "Docker"),
];

/// Address ranges handed out by virtualization host-only and NAT networks.
pub const VIRTUAL_IP_PREFIXES: &[(&str, &str)] = &[
    ("192.168.56.", "VirtualBox host-only"),
    ("192.168.99.", "Docker Machine"),
    ("172.17.", "Docker bridge"),
    ("10.0.75.", "Docker for Windows"),
    ("192.168.65.", "Docker Desktop"),
    ("10.211.55.", "Parallels shared"),
    ("10.37.129.", "Parallels host-only"),
    ("192.168.122.", "libvirt default"),
];

/// Canonical MAC form: lowercase, `:` separated.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if hex.len() != 12 || hex.chars().all(|c| c == '0') {
        return None;
    }
    let pairs: Vec<&str> = (0..12).step_by(2).map(|i| &hex[i..i + 2]).collect();
    Some(pairs.join(":"))
}

/// Built-in signatures plus configured extras.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualSignatures {
    mac_prefixes: Vec<String>,
    ip_prefixes: Vec<String>,
}

impl Default for VirtualSignatures {
    fn default() -> Self {
        Self::from_settings(&NetworkSettings::default())
    }
}

impl VirtualSignatures {
    pub fn from_settings(settings: &NetworkSettings) -> Self {
        let mac_prefixes = VIRTUAL_MAC_PREFIXES
            .iter()
            .map(|(prefix, _)| prefix.to_string())
            .chain(
                settings
                    .extra_virtual_mac_prefixes
                    .iter()
                    .map(|p| p.trim().to_ascii_lowercase().replace('-', ":")),
            )
            .filter(|p| !p.is_empty())
            .collect();
        let ip_prefixes = VIRTUAL_IP_PREFIXES
            .iter()
            .map(|(prefix, _)| prefix.to_string())
            .chain(settings.extra_virtual_ip_prefixes.iter().map(|p| p.trim().to_string()))
            .filter(|p| !p.is_empty())
            .collect();
        Self {
            mac_prefixes,
            ip_prefixes,
        }
    }

    pub fn is_virtual_mac(&self, mac: &str) -> bool {
        match normalize_mac(mac) {
            Some(mac) => self.mac_prefixes.iter().any(|p| mac.starts_with(p.as_str())),
            None => false,
        }
    }

    pub fn is_virtual_ip(&self, address: &str) -> bool {
        self.ip_prefixes.iter().any(|p| address.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> InterfaceAddress {
        InterfaceAddress::parse(s, None).unwrap()
    }

    #[test]
    fn test_parse_strips_scope_and_prefix() {
        let v6 = addr("fe80::1c2a:3bff:fe4d:5e6f%en0");
        assert_eq!(v6.address, "fe80::1c2a:3bff:fe4d:5e6f");
        assert_eq!(v6.family, AddressFamily::Ipv6);
        assert!(v6.is_link_local());

        let v4 = addr("10.1.2.3/24");
        assert_eq!(v4.address, "10.1.2.3");
        assert_eq!(v4.netmask.as_deref(), Some("24"));
        assert!(v4.is_routable_ipv4());

        assert!(InterfaceAddress::parse("not-an-ip", None).is_none());
    }

    #[test]
    fn test_display_address_prefers_routable_ipv4() {
        let list = vec![addr("fe80::1"), addr("2001:db8::5"), addr("192.168.1.10"), addr("127.0.0.1")];
        assert_eq!(display_address(&list, true).as_deref(), Some("192.168.1.10"));
    }

    #[test]
    fn test_display_address_inactive_avoids_link_local() {
        let list = vec![addr("169.254.10.20"), addr("2001:db8::5")];
        assert_eq!(display_address(&list, false).as_deref(), Some("2001:db8::5"));
        assert_eq!(display_address(&list, true).as_deref(), Some("169.254.10.20"));

        let only_link_local = vec![addr("169.254.10.20")];
        assert_eq!(display_address(&only_link_local, false).as_deref(), Some("169.254.10.20"));
        assert_eq!(display_address(&[addr("127.0.0.1")], true), None);
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("00-0C-29-AB-CD-EF").as_deref(), Some("00:0c:29:ab:cd:ef"));
        assert_eq!(normalize_mac("000c29abcdef").as_deref(), Some("00:0c:29:ab:cd:ef"));
        assert_eq!(normalize_mac("00:00:00:00:00:00"), None);
        assert_eq!(normalize_mac("garbage"), None);
    }

    #[test]
    fn test_virtual_signatures() {
        let sigs = VirtualSignatures::default();
        assert!(sigs.is_virtual_mac("00:50:56:c0:00:08"));
        assert!(sigs.is_virtual_mac("02-42-AC-11-00-02"));
        assert!(!sigs.is_virtual_mac("a4:83:e7:11:22:33"));
        assert!(sigs.is_virtual_ip("192.168.56.1"));
        assert!(!sigs.is_virtual_ip("192.168.5.1"));

        let custom = VirtualSignatures::from_settings(&NetworkSettings {
            extra_virtual_mac_prefixes: vec!["A4-83-E7".to_string()],
            extra_virtual_ip_prefixes: vec![],
        });
        assert!(custom.is_virtual_mac("a4:83:e7:11:22:33"));
    }
}
