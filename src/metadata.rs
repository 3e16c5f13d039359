//! # Metadata Records
//!
//! Records describing stored blobs and keys, and the repository they are
//! written to once an upload has fully succeeded.
//!
//! The production repositories are plain CRUD over a SQL database and live
//! outside this crate. [`MetadataStore`] is the boundary the orchestrator
//! talks to. [`MemoryMetadataStore`] backs tests; [`JsonMetadataStore`]
//! keeps the same records in a single JSON file so the CLI remembers them
//! between runs.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Role of a stored key artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Public half of a key pair
    Public,
    /// Private half of a key pair
    Private,
    /// Symmetric key
    Symmetric,
}

impl KeyType {
    /// Lowercase name, used in storage paths
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Public => "public",
            KeyType::Private => "private",
            KeyType::Symmetric => "symmetric",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "public" => Ok(KeyType::Public),
            "private" => Ok(KeyType::Private),
            "symmetric" => Ok(KeyType::Symmetric),
            _ => Err(Error::InvalidKeyType(s.to_string())),
        }
    }
}

/// Key algorithm family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyAlgorithm {
    /// AES (symmetric)
    Aes,
    /// RSA
    Rsa,
    /// ECDSA over a NIST curve
    Ec,
}

impl KeyAlgorithm {
    /// Uppercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Aes => "AES",
            KeyAlgorithm::Rsa => "RSA",
            KeyAlgorithm::Ec => "EC",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AES" => Ok(KeyAlgorithm::Aes),
            "RSA" => Ok(KeyAlgorithm::Rsa),
            "EC" | "ECDSA" => Ok(KeyAlgorithm::Ec),
            _ => Err(Error::InvalidAlgorithm(s.to_string())),
        }
    }
}

/// Metadata about a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMeta {
    /// Blob id (UUID v4)
    pub id: String,
    /// Display name, usually the original file name
    pub name: String,
    /// Stored size in bytes
    pub size: u64,
    /// File extension of `name`, lowercased (empty if none)
    #[serde(rename = "type")]
    pub blob_type: String,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Owning user
    pub user_id: String,
    /// Symmetric key the stored bytes are encrypted with
    pub encryption_key_id: Option<String>,
    /// Key used to sign the blob
    pub sign_key_id: Option<String>,
}

impl BlobMeta {
    /// Storage path: `{blobId}/{name}`
    pub fn storage_path(&self) -> String {
        blob_path(&self.id, &self.name)
    }
}

/// Metadata about a stored key artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoKeyMeta {
    /// Key id (UUID v4)
    pub id: String,
    /// Shared by the two halves of an asymmetric pair
    pub key_pair_id: String,
    /// Which artifact this is
    pub key_type: KeyType,
    /// Algorithm family
    pub algorithm: KeyAlgorithm,
    /// Bits (AES 128/192/256, RSA modulus, EC curve size)
    pub key_size: u32,
    /// Unix timestamp in milliseconds
    pub created_at: i64,
    /// Owning user
    pub user_id: String,
}

impl CryptoKeyMeta {
    /// Storage path: `{keyPairId}/{keyId}-{keyType}`
    pub fn storage_path(&self) -> String {
        key_path(&self.key_pair_id, &self.id, self.key_type)
    }
}

/// `{blobId}/{blobName}`
pub fn blob_path(blob_id: &str, name: &str) -> String {
    format!("{}/{}", blob_id, name)
}

/// `{keyPairId}/{keyId}-{keyType}`
pub fn key_path(key_pair_id: &str, key_id: &str, key_type: KeyType) -> String {
    format!("{}/{}-{}", key_pair_id, key_id, key_type)
}

/// Repository for blob and key metadata
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Record a new blob (fails if the id is already recorded)
    async fn insert_blob(&self, meta: BlobMeta) -> Result<()>;
    /// Look up a blob by id
    async fn get_blob(&self, id: &str) -> Result<Option<BlobMeta>>;
    /// Remove a blob record, returning whether it existed
    async fn delete_blob(&self, id: &str) -> Result<bool>;
    /// All blobs owned by `user_id`, oldest first
    async fn list_blobs(&self, user_id: &str) -> Result<Vec<BlobMeta>>;

    /// Record a new key (fails if the id is already recorded)
    async fn insert_key(&self, meta: CryptoKeyMeta) -> Result<()>;
    /// Look up a key by id
    async fn get_key(&self, id: &str) -> Result<Option<CryptoKeyMeta>>;
    /// Remove a key record, returning whether it existed
    async fn delete_key(&self, id: &str) -> Result<bool>;
    /// All keys sharing `key_pair_id`
    async fn list_key_pair(&self, key_pair_id: &str) -> Result<Vec<CryptoKeyMeta>>;
}

/// In-memory metadata repository
#[derive(Clone, Default)]
pub struct MemoryMetadataStore {
    blobs: Arc<DashMap<String, BlobMeta>>,
    keys: Arc<DashMap<String, CryptoKeyMeta>>,
}

impl MemoryMetadataStore {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blob records
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// Number of key records
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert_blob(&self, meta: BlobMeta) -> Result<()> {
        match self.blobs.entry(meta.id.clone()) {
            Entry::Occupied(_) => Err(Error::MetadataError(format!(
                "blob {} already recorded",
                meta.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(meta);
                Ok(())
            }
        }
    }

    async fn get_blob(&self, id: &str) -> Result<Option<BlobMeta>> {
        Ok(self.blobs.get(id).map(|entry| entry.value().clone()))
    }

    async fn delete_blob(&self, id: &str) -> Result<bool> {
        Ok(self.blobs.remove(id).is_some())
    }

    async fn list_blobs(&self, user_id: &str) -> Result<Vec<BlobMeta>> {
        let mut blobs: Vec<BlobMeta> = self
            .blobs
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        blobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(blobs)
    }

    async fn insert_key(&self, meta: CryptoKeyMeta) -> Result<()> {
        match self.keys.entry(meta.id.clone()) {
            Entry::Occupied(_) => Err(Error::MetadataError(format!(
                "key {} already recorded",
                meta.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(meta);
                Ok(())
            }
        }
    }

    async fn get_key(&self, id: &str) -> Result<Option<CryptoKeyMeta>> {
        Ok(self.keys.get(id).map(|entry| entry.value().clone()))
    }

    async fn delete_key(&self, id: &str) -> Result<bool> {
        Ok(self.keys.remove(id).is_some())
    }

    async fn list_key_pair(&self, key_pair_id: &str) -> Result<Vec<CryptoKeyMeta>> {
        let mut keys: Vec<CryptoKeyMeta> = self
            .keys
            .iter()
            .filter(|entry| entry.value().key_pair_id == key_pair_id)
            .map(|entry| entry.value().clone())
            .collect();
        keys.sort_by_key(|k| k.key_type.as_str());
        Ok(keys)
    }
}

/// On-disk layout of [`JsonMetadataStore`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    blobs: Vec<BlobMeta>,
    keys: Vec<CryptoKeyMeta>,
}

/// Metadata repository persisted to one JSON file.
///
/// Every mutation rewrites the whole file (temp file + rename). Meant for
/// the CLI and small local vaults, not for concurrent writers in separate
/// processes.
pub struct JsonMetadataStore {
    path: PathBuf,
    records: MemoryMetadataStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonMetadataStore {
    /// Load the repository at `path`, starting empty if the file is absent
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = MemoryMetadataStore::new();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
                for blob in snapshot.blobs {
                    records.blobs.insert(blob.id.clone(), blob);
                }
                for key in snapshot.keys {
                    records.keys.insert(key.id.clone(), key);
                }
                tracing::debug!(
                    path = %path.display(),
                    blobs = records.blob_count(),
                    keys = records.key_count(),
                    "Loaded metadata"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::ReadError {
                    path,
                    reason: e.to_string(),
                })
            }
        }

        Ok(Self {
            path,
            records,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut snapshot = Snapshot {
            blobs: self.records.blobs.iter().map(|e| e.value().clone()).collect(),
            keys: self.records.keys.iter().map(|e| e.value().clone()).collect(),
        };
        snapshot.blobs.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.keys.sort_by(|a, b| a.id.cmp(&b.id));
        let json = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::MetadataError(format!("{}: {}", parent.display(), e)))?;
        }

        let tmp = self.path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::MetadataError(format!("{}: {}", self.path.display(), e)));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::MetadataError(format!("{}: {}", self.path.display(), e)));
        }
        Ok(())
    }

    /// Persist, undoing `undo` in memory when the write fails.
    async fn persist_or(&self, undo: impl FnOnce(&MemoryMetadataStore)) -> Result<()> {
        if let Err(e) = self.persist().await {
            tracing::error!(error = %e, path = %self.path.display(), "Failed to persist metadata");
            undo(&self.records);
            return Err(e);
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for JsonMetadataStore {
    async fn insert_blob(&self, meta: BlobMeta) -> Result<()> {
        let id = meta.id.clone();
        self.records.insert_blob(meta).await?;
        self.persist_or(|r| {
            r.blobs.remove(&id);
        })
        .await
    }

    async fn get_blob(&self, id: &str) -> Result<Option<BlobMeta>> {
        self.records.get_blob(id).await
    }

    async fn delete_blob(&self, id: &str) -> Result<bool> {
        let Some((_, removed)) = self.records.blobs.remove(id) else {
            return Ok(false);
        };
        self.persist_or(|r| {
            r.blobs.insert(removed.id.clone(), removed);
        })
        .await?;
        Ok(true)
    }

    async fn list_blobs(&self, user_id: &str) -> Result<Vec<BlobMeta>> {
        self.records.list_blobs(user_id).await
    }

    async fn insert_key(&self, meta: CryptoKeyMeta) -> Result<()> {
        let id = meta.id.clone();
        self.records.insert_key(meta).await?;
        self.persist_or(|r| {
            r.keys.remove(&id);
        })
        .await
    }

    async fn get_key(&self, id: &str) -> Result<Option<CryptoKeyMeta>> {
        self.records.get_key(id).await
    }

    async fn delete_key(&self, id: &str) -> Result<bool> {
        let Some((_, removed)) = self.records.keys.remove(id) else {
            return Ok(false);
        };
        self.persist_or(|r| {
            r.keys.insert(removed.id.clone(), removed);
        })
        .await?;
        Ok(true)
    }

    async fn list_key_pair(&self, key_pair_id: &str) -> Result<Vec<CryptoKeyMeta>> {
        self.records.list_key_pair(key_pair_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str, pair: &str, key_type: KeyType) -> CryptoKeyMeta {
        CryptoKeyMeta {
            id: id.into(),
            key_pair_id: pair.into(),
            key_type,
            algorithm: KeyAlgorithm::Rsa,
            key_size: 2048,
            created_at: 1_700_000_000_000,
            user_id: "user-1".into(),
        }
    }

    #[test]
    fn test_storage_paths() {
        let meta = key("k1", "pair-9", KeyType::Private);
        assert_eq!(meta.storage_path(), "pair-9/k1-private");
        assert_eq!(blob_path("b1", "report.pdf"), "b1/report.pdf");
    }

    #[test]
    fn test_blob_meta_json_shape() {
        let meta = BlobMeta {
            id: "b1".into(),
            name: "report.pdf".into(),
            size: 10,
            blob_type: "pdf".into(),
            created_at: 1,
            user_id: "u".into(),
            encryption_key_id: Some("k".into()),
            sign_key_id: None,
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "pdf");
        assert_eq!(json["userId"], "u");
        assert_eq!(json["encryptionKeyId"], "k");
        assert!(json["signKeyId"].is_null());

        let back: BlobMeta = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }

    #[test]
    fn test_key_meta_json_shape() {
        let json = serde_json::to_value(key("k1", "p1", KeyType::Symmetric)).unwrap();
        assert_eq!(json["keyType"], "symmetric");
        assert_eq!(json["algorithm"], "RSA");
        assert_eq!(json["keyPairId"], "p1");
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("Private".parse::<KeyType>().unwrap(), KeyType::Private);
        assert!(matches!("shared".parse::<KeyType>(), Err(Error::InvalidKeyType(_))));
        assert_eq!("ecdsa".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Ec);
        assert!(matches!(
            "DES".parse::<KeyAlgorithm>(),
            Err(Error::InvalidAlgorithm(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_keys() {
        let store = MemoryMetadataStore::new();
        store.insert_key(key("k1", "p1", KeyType::Public)).await.unwrap();
        store.insert_key(key("k2", "p1", KeyType::Private)).await.unwrap();
        store.insert_key(key("k3", "p2", KeyType::Symmetric)).await.unwrap();

        let pair = store.list_key_pair("p1").await.unwrap();
        assert_eq!(pair.len(), 2);
        assert_eq!(pair[0].key_type, KeyType::Private);

        assert!(matches!(
            store.insert_key(key("k1", "p1", KeyType::Public)).await,
            Err(Error::MetadataError(_))
        ));

        assert!(store.delete_key("k1").await.unwrap());
        assert!(store.get_key("k1").await.unwrap().is_none());
        assert_eq!(store.key_count(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicate_inserts_keep_first() {
        let store = MemoryMetadataStore::new();

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut meta = key("dup", "p1", KeyType::Symmetric);
                    meta.key_size = 128 + i;
                    store.insert_key(meta.clone()).await.map(|_| meta.key_size)
                })
            })
            .collect();

        let mut winners = Vec::new();
        for task in tasks {
            if let Ok(size) = task.await.unwrap() {
                winners.push(size);
            }
        }

        assert_eq!(winners.len(), 1);
        assert_eq!(store.key_count(), 1);
        let stored = store.get_key("dup").await.unwrap().unwrap();
        assert_eq!(stored.key_size, winners[0]);
    }

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta").join("vault.json");

        let store = JsonMetadataStore::open(&path).await.unwrap();
        store.insert_key(key("k1", "p1", KeyType::Private)).await.unwrap();
        store.insert_key(key("k2", "p1", KeyType::Public)).await.unwrap();
        assert!(store.delete_key("k2").await.unwrap());
        assert!(!store.delete_key("k2").await.unwrap());

        let reopened = JsonMetadataStore::open(&path).await.unwrap();
        assert_eq!(reopened.get_key("k1").await.unwrap().unwrap().key_pair_id, "p1");
        assert!(reopened.get_key("k2").await.unwrap().is_none());
        assert_eq!(reopened.list_key_pair("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.json");
        std::fs::write(&path, b"{not json").unwrap();

        assert!(matches!(
            JsonMetadataStore::open(&path).await,
            Err(Error::SerializationError(_))
        ));
    }
}
