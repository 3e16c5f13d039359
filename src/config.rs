//! Vault configuration.
//!
//! Plain structs with defaults. The `vault` binary fills them from command
//! line flags and environment variables; library users build them directly.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default PKCS#11 module (SoftHSM2 on Debian/Ubuntu)
pub const DEFAULT_MODULE_PATH: &str = "/usr/lib/softhsm/libsofthsm2.so";

/// Default deadline for a single external tool invocation
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Top-level configuration
#[derive(Debug, Clone, Default)]
pub struct VaultConfig {
    /// Blob and key-vault storage
    pub storage: StorageConfig,
    /// Hardware token access
    pub hsm: HsmConfig,
}

/// Where the filesystem-backed stores keep their objects
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory of the blob store
    pub blob_root: PathBuf,
    /// Root directory of the key-vault store
    pub key_root: PathBuf,
    /// JSON file holding blob and key metadata
    pub metadata_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            blob_root: PathBuf::from("vault-data/blobs"),
            key_root: PathBuf::from("vault-data/keys"),
            metadata_path: PathBuf::from("vault-data/metadata.json"),
        }
    }
}

/// PKCS#11 token and OpenSSL engine settings
#[derive(Clone)]
pub struct HsmConfig {
    /// Path to the PKCS#11 module shared library
    pub module_path: PathBuf,
    /// Token tool executable (`pkcs11-tool`)
    pub tool: String,
    /// OpenSSL executable
    pub openssl: String,
    /// OpenSSL engine id
    pub engine: String,
    /// Slot used when initializing a token
    pub slot_id: String,
    /// Security officer PIN
    pub so_pin: String,
    /// User PIN
    pub user_pin: String,
    /// Deadline for each external invocation
    pub timeout: Duration,
}

impl Default for HsmConfig {
    fn default() -> Self {
        Self {
            module_path: PathBuf::from(DEFAULT_MODULE_PATH),
            tool: "pkcs11-tool".to_string(),
            openssl: "openssl".to_string(),
            engine: "pkcs11".to_string(),
            slot_id: "0".to_string(),
            so_pin: String::new(),
            user_pin: String::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl fmt::Debug for HsmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HsmConfig")
            .field("module_path", &self.module_path)
            .field("tool", &self.tool)
            .field("openssl", &self.openssl)
            .field("engine", &self.engine)
            .field("slot_id", &self.slot_id)
            .field("so_pin", &"[REDACTED]")
            .field("user_pin", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = VaultConfig::default();
        assert_eq!(config.hsm.tool, "pkcs11-tool");
        assert_eq!(config.hsm.engine, "pkcs11");
        assert_eq!(config.hsm.timeout, Duration::from_secs(30));
        assert_ne!(config.storage.blob_root, config.storage.key_root);
    }

    #[test]
    fn test_debug_redacts_pins() {
        let config = HsmConfig {
            so_pin: "12345678".into(),
            user_pin: "1234".into(),
            ..HsmConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("12345678"));
        assert!(!debug.contains("\"1234\""));
        assert!(debug.contains("[REDACTED]"));
    }
}
