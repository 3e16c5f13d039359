//! # CryptVault
//!
//! Key vault core: generates, stores and uses symmetric and asymmetric keys
//! (in software or on a PKCS#11 token) to encrypt, decrypt, sign and verify
//! blobs, and persists blobs and key material without leaving orphaned
//! objects behind when an upload fails halfway.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CRYPTVAULT MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                     UploadOrchestrator                            │ │
//! │  │  create keys, upload blob batches, compensate on failure          │ │
//! │  └──────┬──────────────────┬──────────────────────┬──────────────────┘ │
//! │         │                  │                      │                    │
//! │  ┌──────▼──────┐  ┌────────▼────────┐  ┌──────────▼──────────┐        │
//! │  │   Crypto    │  │     Storage     │  │      Metadata       │        │
//! │  │             │  │                 │  │                     │        │
//! │  │ - AES-CBC   │  │ - MemoryStore   │  │ - BlobMeta          │        │
//! │  │ - RSA       │  │ - FileStore     │  │ - CryptoKeyMeta     │        │
//! │  │ - ECDSA     │  │                 │  │ - JSON / in-memory  │        │
//! │  └─────────────┘  └─────────────────┘  └─────────────────────┘        │
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │  HSM: Pkcs11Token ──► ProcessRunner ──► pkcs11-tool / openssl     │ │
//! │  └───────────────────────────────────────────────────────────────────┘ │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Storage and token settings
//! - [`crypto`] - AES-CBC, RSA PKCS#1 v1.5 and ECDSA with PEM/key files
//! - [`hsm`] - PKCS#11 token adapter driven through external tools
//! - [`storage`] - Object stores for blobs and key material
//! - [`metadata`] - Blob and key records and their repositories
//! - [`orchestrator`] - Rollback-safe uploads across the stores
//!
//! ## Algorithms
//!
//! | Algorithm | Key sizes | Operations |
//! |-----------|-----------|------------|
//! | AES-CBC + PKCS#7 | 128, 192, 256 | encrypt, decrypt |
//! | RSA PKCS#1 v1.5 | 2048, 3072, 4096 | encrypt, decrypt, sign, verify |
//! | ECDSA (SHA-256) | P-224, P-256, P-384, P-521 | sign, verify |
//! | PKCS#11 token | RSA / EC | encrypt, decrypt, sign, verify |

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod error;
pub mod hsm;
pub mod metadata;
pub mod orchestrator;
pub mod storage;
/// Wall-clock timestamps.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{HsmConfig, StorageConfig, VaultConfig};
pub use error::{Error, ErrorKind, Result};
pub use metadata::{BlobMeta, CryptoKeyMeta, KeyAlgorithm, KeyType};
pub use orchestrator::{BlobInput, UploadOrchestrator};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of CryptVault
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
