//! System / OS module normalization and platform detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::network::InterfaceKind;
use crate::reconcile::{lookup, Field};
use crate::timestamp::parse_timestamp;

mod fields {
    use crate::reconcile::Field;

    pub const PLATFORM: Field = Field::new(
        "platform",
        &["platform", "Platform", "osType", "os_type", "osFamily", "os_family", "clientPlatform"],
    );
    pub const HOSTNAME: Field = Field::new(
        "hostname",
        &["hostname", "hostName", "HostName", "computerName", "ComputerName", "CsName", "localHostName"],
    );
    pub const DEVICE_NAME: Field = Field::new(
        "deviceName",
        &["deviceName", "device_name", "friendlyName", "computerName", "ComputerName", "name"],
    );
    pub const OS_NAME: Field = Field::new(
        "osName",
        &[
            "osName",
            "os_name",
            "OsName",
            "operatingSystem.name",
            "operatingSystem",
            "productName",
            "ProductName",
            "Caption",
            "os",
        ],
    );
    pub const OS_VERSION: Field = Field::new(
        "osVersion",
        &[
            "osVersion",
            "os_version",
            "OsVersion",
            "operatingSystem.version",
            "productVersion",
            "displayVersion",
            "DisplayVersion",
            "version",
            "Version",
        ],
    );
    pub const OS_BUILD: Field = Field::new(
        "osBuild",
        &["osBuild", "os_build", "buildNumber", "BuildNumber", "build", "operatingSystem.build", "buildVersion"],
    );
    pub const ARCHITECTURE: Field = Field::new(
        "architecture",
        &["architecture", "arch", "OsArchitecture", "osArchitecture", "cpuArchitecture", "processorArchitecture"],
    );
    pub const UPTIME: Field = Field::new(
        "uptimeSeconds",
        &["uptimeSeconds", "uptime_seconds", "uptime", "Uptime", "systemUptime"],
    );
    pub const LAST_BOOT: Field = Field::new(
        "lastBoot",
        &["lastBoot", "last_boot", "lastBootTime", "LastBootUpTime", "bootTime", "boot_time"],
    );
    pub const CLIENT_VERSION: Field = Field::new(
        "clientVersion",
        &["clientVersion", "client_version", "agentVersion", "agent_version", "collectorVersion", "reportMateVersion"],
    );
    pub const TIMEZONE: Field = Field::new("timeZone", &["timeZone", "timezone", "time_zone", "TimeZone"]);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
    #[default]
    Unknown,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Macos => "macos",
            Platform::Linux => "linux",
            Platform::Unknown => "unknown",
        }
    }

    /// Match a platform or OS name.
    pub fn from_name(name: &str) -> Option<Self> {
        let n = name.trim().to_ascii_lowercase();
        if n.contains("windows") || n == "win" || n == "win32" || n == "win64" {
            Some(Platform::Windows)
        } else if n.contains("mac") || n.contains("darwin") || n.contains("os x") {
            Some(Platform::Macos)
        } else if ["linux", "ubuntu", "debian", "fedora", "rhel", "centos", "arch"]
            .iter()
            .any(|d| n.contains(d))
        {
            Some(Platform::Linux)
        } else {
            None
        }
    }

    /// Detect the reporting platform: explicit fields, then OS name, then
    /// module keys only one platform's collector emits.
    pub fn detect(raw: &Value, system: Option<&Value>) -> Self {
        let scopes = system.into_iter().chain(std::iter::once(raw));
        for scope in scopes.clone() {
            if let Some(p) = fields::PLATFORM.string(scope).and_then(|s| Self::from_name(&s)) {
                return p;
            }
        }
        for scope in scopes {
            if let Some(p) = fields::OS_NAME.string(scope).and_then(|s| Self::from_name(&s)) {
                return p;
            }
        }
        Self::from_dialect(raw)
    }

    fn from_dialect(raw: &Value) -> Self {
        const WINDOWS_HINTS: &[&str] = &["cimian", "modules.cimian", "security.bitlocker", "modules.security.bitlocker"];
        const MACOS_HINTS: &[&str] = &["munki", "modules.munki", "security.fileVault", "modules.security.fileVault"];
        if WINDOWS_HINTS.iter().any(|p| lookup(raw, p).is_some()) {
            Platform::Windows
        } else if MACOS_HINTS.iter().any(|p| lookup(raw, p).is_some()) {
            Platform::Macos
        } else {
            Platform::Unknown
        }
    }

    /// Adapter type a VPN tunnel most likely rides on.
    pub fn default_interface_kind(&self) -> Option<InterfaceKind> {
        match self {
            Platform::Macos => Some(InterfaceKind::Wireless),
            Platform::Windows | Platform::Linux => Some(InterfaceKind::Ethernet),
            Platform::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_boot: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// Build the system sub-object. Root-level fields fill gaps the module
/// leaves, since older collectors put hostname and OS at the top level.
pub fn normalize_system(module: Option<&Value>, raw: &Value, now: DateTime<Utc>) -> SystemInfo {
    let pick = |field: &Field| -> Option<String> {
        module
            .and_then(|m| field.string(m))
            .or_else(|| field.string(raw))
    };

    let last_boot = module
        .and_then(|m| fields::LAST_BOOT.find_map(m, parse_timestamp))
        .filter(|boot| *boot <= now);
    let uptime_seconds = module
        .and_then(|m| fields::UPTIME.u64(m))
        .or_else(|| last_boot.map(|boot| (now - boot).num_seconds().max(0) as u64));

    SystemInfo {
        platform: Platform::detect(raw, module),
        hostname: pick(&fields::HOSTNAME),
        device_name: pick(&fields::DEVICE_NAME),
        os_name: pick(&fields::OS_NAME),
        os_version: pick(&fields::OS_VERSION),
        os_build: pick(&fields::OS_BUILD),
        architecture: pick(&fields::ARCHITECTURE),
        uptime_seconds,
        last_boot,
        client_version: pick(&fields::CLIENT_VERSION),
        time_zone: pick(&fields::TIMEZONE),
    }
}
