//! Security module normalization. Every field is optional; nothing is guessed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::reconcile::lookup;

mod fields {
    use crate::reconcile::Field;

    pub const FIREWALL: Field = Field::new(
        "firewallEnabled",
        &[
            "firewall.enabled",
            "firewall.isEnabled",
            "firewall.Enabled",
            "firewall.status",
            "firewall.globalState",
            "firewallEnabled",
            "firewall_enabled",
            "firewall",
        ],
    );
    pub const ENCRYPTION_ENABLED: Field = Field::new(
        "encryptionEnabled",
        &[
            "encryption.enabled",
            "encryption.isEnabled",
            "diskEncryption.enabled",
            "bitlocker.enabled",
            "bitLocker.enabled",
            "bitlocker.isEnabled",
            "bitlocker.protectionStatus",
            "bitLocker.ProtectionStatus",
            "fileVault.enabled",
            "filevault.enabled",
            "fileVault.status",
            "filevault.status",
            "fileVaultEnabled",
            "filevault_enabled",
            "encryptionEnabled",
            "diskEncryption",
            "encryption",
        ],
    );
    pub const ENCRYPTION_METHOD: Field = Field::new(
        "encryptionMethod",
        &[
            "encryption.method",
            "diskEncryption.method",
            "bitlocker.encryptionMethod",
            "bitLocker.EncryptionMethod",
            "encryptionMethod",
        ],
    );
    pub const ENCRYPTION_STATUS: Field = Field::new(
        "encryptionStatus",
        &[
            "encryption.status",
            "bitlocker.volumeStatus",
            "bitLocker.VolumeStatus",
            "fileVault.status",
            "filevault.status",
        ],
    );

    pub const AV_NAME: Field = Field::new(
        "name",
        &["name", "Name", "displayName", "productName", "product"],
    );
    pub const AV_ENABLED: Field = Field::new(
        "enabled",
        &[
            "enabled",
            "isEnabled",
            "Enabled",
            "realTimeProtectionEnabled",
            "RealTimeProtectionEnabled",
            "AntivirusEnabled",
            "status",
        ],
    );
    pub const AV_UP_TO_DATE: Field = Field::new(
        "upToDate",
        &["upToDate", "isUpToDate", "up_to_date", "signaturesUpToDate", "definitionsUpToDate"],
    );
    pub const AV_VERSION: Field = Field::new(
        "signatureVersion",
        &["signatureVersion", "AntivirusSignatureVersion", "definitionsVersion", "version"],
    );

    pub const TPM: Field = Field::new(
        "tpmPresent",
        &["tpm.present", "tpm.isPresent", "tpm.TpmPresent", "tpmPresent", "tpm_present", "tpm"],
    );
    pub const SECURE_BOOT: Field = Field::new(
        "secureBoot",
        &["secureBoot.enabled", "secureBoot", "secure_boot", "secureBootEnabled", "SecureBootEnabled"],
    );
    pub const SIP: Field = Field::new(
        "sipEnabled",
        &["sip.enabled", "systemIntegrityProtection.enabled", "systemIntegrityProtection", "sipEnabled", "sip"],
    );
    pub const GATEKEEPER: Field = Field::new(
        "gatekeeperEnabled",
        &["gatekeeper.enabled", "gatekeeper.status", "gatekeeperEnabled", "gatekeeper"],
    );
}

/// Antivirus containers and the product name implied by each.
const ANTIVIRUS_SCOPES: &[(&str, Option<&str>)] = &[
    ("antivirus", None),
    ("antiVirus", None),
    ("windowsDefender", Some("Windows Defender")),
    ("defender", Some("Windows Defender")),
    ("xprotect", Some("XProtect")),
    ("XProtect", Some("XProtect")),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntivirusStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_to_date: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firewall_enabled: Option<bool>,
    #[serde(default)]
    pub encryption: EncryptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antivirus: Option<AntivirusStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tpm_present: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_boot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sip_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gatekeeper_enabled: Option<bool>,
}

impl SecurityInfo {
    /// Count of controls explicitly reported as off.
    pub fn disabled_controls(&self) -> usize {
        [
            self.firewall_enabled,
            self.encryption.enabled,
            self.antivirus.as_ref().and_then(|av| av.enabled),
            self.secure_boot,
            self.sip_enabled,
            self.gatekeeper_enabled,
        ]
        .iter()
        .filter(|flag| **flag == Some(false))
        .count()
    }
}

pub fn normalize_security(module: Option<&Value>) -> SecurityInfo {
    let Some(sec) = module else {
        return SecurityInfo::default();
    };

    SecurityInfo {
        firewall_enabled: fields::FIREWALL.bool(sec),
        encryption: encryption(sec),
        antivirus: antivirus(sec),
        tpm_present: fields::TPM.bool(sec),
        secure_boot: fields::SECURE_BOOT.bool(sec),
        sip_enabled: fields::SIP.bool(sec),
        gatekeeper_enabled: fields::GATEKEEPER.bool(sec),
    }
}

fn encryption(sec: &Value) -> EncryptionStatus {
    let present = |keys: &[&str]| keys.iter().any(|k| lookup(sec, k).is_some());
    let method = fields::ENCRYPTION_METHOD.string(sec).or_else(|| {
        if present(&["bitlocker", "bitLocker", "BitLocker"]) {
            Some("BitLocker".to_string())
        } else if present(&["fileVault", "filevault", "FileVault", "fileVaultEnabled"]) {
            Some("FileVault".to_string())
        } else {
            None
        }
    });
    EncryptionStatus {
        enabled: fields::ENCRYPTION_ENABLED.bool(sec),
        method,
        status: fields::ENCRYPTION_STATUS.string(sec),
    }
}

fn antivirus(sec: &Value) -> Option<AntivirusStatus> {
    ANTIVIRUS_SCOPES.iter().find_map(|(path, implied)| {
        let scope = sec.get(*path).filter(|v| v.is_object())?;
        Some(AntivirusStatus {
            name: fields::AV_NAME
                .string(scope)
                .or_else(|| implied.map(str::to_string)),
            enabled: fields::AV_ENABLED.bool(scope),
            up_to_date: fields::AV_UP_TO_DATE.bool(scope),
            signature_version: fields::AV_VERSION.string(scope),
        })
    })
}
