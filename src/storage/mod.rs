//! # Storage Module
//!
//! Opaque byte storage for encrypted blobs and key material.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE LAYER                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  StorageConnector Trait                                         │   │
//! │  │  ───────────────────────                                         │   │
//! │  │                                                                 │   │
//! │  │  • upload(path, bytes)  - Store an object (replaces existing)  │   │
//! │  │  • download(path)       - Fetch an object                      │   │
//! │  │  • delete(path)         - Remove an object                     │   │
//! │  │  • exists(path)         - Check if an object exists            │   │
//! │  │  • list(prefix)         - Enumerate object paths               │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌───────────────┐  ┌───────────────┐                                  │
//! │  │  MemoryStore  │  │   FileStore   │                                  │
//! │  │               │  │               │                                  │
//! │  │ - in process  │  │ - one file    │                                  │
//! │  │ - tests, CLI  │  │   per object  │                                  │
//! │  │   dry runs    │  │ - atomic      │                                  │
//! │  │               │  │   writes      │                                  │
//! │  └───────────────┘  └───────────────┘                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Object Paths
//!
//! | Store | Path |
//! |-------|------|
//! | Blobs | `{blobId}/{blobName}` |
//! | Keys | `{keyPairId}/{keyId}-{keyType}` |
//!
//! Paths are relative, `/`-separated and may not contain empty, `.` or `..`
//! segments.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// A backing object store for blobs or keys
#[async_trait]
pub trait StorageConnector: Send + Sync {
    /// Store `data` at `path`, replacing any existing object
    async fn upload(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Fetch the object at `path` (`StorageNotFound` if absent)
    async fn download(&self, path: &str) -> Result<Vec<u8>>;

    /// Remove the object at `path`, returning whether it existed
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Check whether an object exists at `path`
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Paths of all objects starting with `prefix`, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Reject paths that are empty, absolute, or contain `.`/`..` segments.
pub fn validate_object_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::EmptyParameter("path"));
    }
    if path.starts_with('/') || path.contains('\\') || path.contains('\0') {
        return Err(Error::InvalidInput(format!("invalid object path '{}'", path)));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(Error::InvalidInput(format!("invalid object path '{}'", path)));
    }
    Ok(())
}
