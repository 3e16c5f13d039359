//! # Upload Orchestrator
//!
//! Composes the ciphers with the blob store, the key-vault store and the
//! metadata repository, and undoes partial work when a later step fails.
//!
//! ## Blob Batch Upload
//!
//! ```text
//!   for each file ──► read bytes ──► blobs.upload("{blobId}/{name}")
//!                          │                    │
//!                          └──── any failure ───┴──► delete every blob
//!                                                    uploaded in this batch,
//!                                                    re-raise the error
//!
//!   all uploaded ──► metadata.insert_blob(...) for each
//!                          │
//!                          └──── failure ──► delete recorded metadata and
//!                                            every blob, re-raise
//! ```
//!
//! Key uploads follow the same shape with `{keyPairId}/{keyId}-{keyType}`
//! paths. For a key pair the private artifact is written first and removed
//! again if the public one fails.
//!
//! ## Guarantees and Gaps
//!
//! Compensation is best effort. A compensating delete that fails is logged
//! as a warning and the original error is still returned; the caller never
//! sees the cleanup error.
//!
//! The blob store and the key-vault store are never written in one
//! transaction. If the process dies between committing a key and committing
//! the blobs that reference it (or vice versa), no compensation runs: a
//! stored key may have no blobs, or a recorded blob may name a key whose
//! write never happened. Nothing here detects or repairs such orphans.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use zeroize::Zeroizing;

use crate::crypto::{aes_cbc, ec, rsa_pkcs1, EcCurve};
use crate::error::{Error, Result};
use crate::metadata::{key_path, BlobMeta, CryptoKeyMeta, KeyAlgorithm, KeyType, MetadataStore};
use crate::storage::StorageConnector;
use crate::time::now_timestamp_millis;

/// RSA modulus sizes for vault-managed keys
pub const RSA_KEY_BITS: [u32; 3] = [2048, 3072, 4096];

/// AES key sizes in bits
pub const AES_KEY_BITS: [u32; 3] = [128, 192, 256];

/// One input of a blob batch
#[derive(Debug, Clone)]
pub enum BlobInput {
    /// A local file, read when the batch reaches it
    File(PathBuf),
    /// Bytes already in memory
    Bytes {
        /// Blob name
        name: String,
        /// Content
        data: Vec<u8>,
    },
}

impl BlobInput {
    /// Input read from `path`
    pub fn file(path: impl Into<PathBuf>) -> Self {
        BlobInput::File(path.into())
    }

    /// Input from memory
    pub fn bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        BlobInput::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    async fn read(&self) -> Result<(String, Vec<u8>)> {
        match self {
            BlobInput::Bytes { name, data } => Ok((name.clone(), data.clone())),
            BlobInput::File(path) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| Error::InvalidInput(format!("{} has no file name", path.display())))?;
                match tokio::fs::read(path).await {
                    Ok(data) => Ok((name, data)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(Error::FileNotFound(path.clone()))
                    }
                    Err(e) => Err(Error::ReadError {
                        path: path.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }
}

/// Serialized key material ready for the key vault
pub struct KeyMaterial {
    /// Raw key bytes or PEM text
    pub bytes: Zeroizing<Vec<u8>>,
    /// Role of the artifact
    pub key_type: KeyType,
}

/// Coordinates uploads across the blob store, key vault and metadata
#[derive(Clone)]
pub struct UploadOrchestrator {
    blobs: Arc<dyn StorageConnector>,
    keys: Arc<dyn StorageConnector>,
    metadata: Arc<dyn MetadataStore>,
}

impl UploadOrchestrator {
    /// Create an orchestrator over the given stores
    pub fn new(
        blobs: Arc<dyn StorageConnector>,
        keys: Arc<dyn StorageConnector>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            blobs,
            keys,
            metadata,
        }
    }

    // ========================================================================
    // BLOBS
    // ========================================================================

    /// Upload a batch of blobs, all or nothing.
    ///
    /// Each blob gets a fresh id and is stored at `{blobId}/{name}`. If any
    /// step fails, every blob this call already stored is deleted before
    /// the error is returned.
    pub async fn upload_blobs(
        &self,
        files: &[BlobInput],
        user_id: &str,
        encryption_key_id: Option<&str>,
        sign_key_id: Option<&str>,
    ) -> Result<Vec<BlobMeta>> {
        require("user_id", user_id)?;

        let mut stored: Vec<BlobMeta> = Vec::with_capacity(files.len());
        for file in files {
            match self
                .upload_one_blob(file, user_id, encryption_key_id, sign_key_id)
                .await
            {
                Ok(meta) => stored.push(meta),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        uploaded = stored.len(),
                        total = files.len(),
                        "Blob batch failed, rolling back"
                    );
                    self.rollback_blobs(&stored, 0, &e).await;
                    return Err(e);
                }
            }
        }

        for (recorded, meta) in stored.iter().enumerate() {
            if let Err(e) = self.metadata.insert_blob(meta.clone()).await {
                tracing::error!(error = %e, blob_id = %meta.id, "Recording blob metadata failed, rolling back");
                self.rollback_blobs(&stored, recorded, &e).await;
                return Err(e);
            }
        }

        tracing::info!(count = stored.len(), user_id, "Blob batch uploaded");
        Ok(stored)
    }

    async fn upload_one_blob(
        &self,
        file: &BlobInput,
        user_id: &str,
        encryption_key_id: Option<&str>,
        sign_key_id: Option<&str>,
    ) -> Result<BlobMeta> {
        let (name, data) = file.read().await?;
        require("name", &name)?;

        let meta = BlobMeta {
            id: uuid::Uuid::new_v4().to_string(),
            blob_type: extension_of(&name),
            size: data.len() as u64,
            name,
            created_at: now_timestamp_millis(),
            user_id: user_id.to_string(),
            encryption_key_id: encryption_key_id.map(str::to_string),
            sign_key_id: sign_key_id.map(str::to_string),
        };

        let path = meta.storage_path();
        if let Err(e) = self.blobs.upload(&path, &data).await {
            // The store may have kept a partial object.
            compensate(self.blobs.as_ref(), &path, &e).await;
            return Err(e);
        }

        tracing::debug!(blob_id = %meta.id, path = %path, size = meta.size, "Blob stored");
        Ok(meta)
    }

    /// Delete the stored objects of `stored` and the first `recorded`
    /// metadata records.
    async fn rollback_blobs(&self, stored: &[BlobMeta], recorded: usize, cause: &Error) {
        for meta in &stored[..recorded] {
            if let Err(e) = self.metadata.delete_blob(&meta.id).await {
                tracing::warn!(blob_id = %meta.id, error = %e, cause = %cause, "Failed to remove blob metadata during rollback");
            }
        }
        let paths: Vec<String> = stored.iter().map(BlobMeta::storage_path).collect();
        join_all(
            paths
                .iter()
                .map(|path| compensate(self.blobs.as_ref(), path, cause)),
        )
        .await;
    }

    /// AES-encrypt each file with the stored symmetric key `key_id` and
    /// upload the ciphertexts as one batch.
    pub async fn upload_encrypted_blobs(
        &self,
        files: &[BlobInput],
        user_id: &str,
        key_id: &str,
        sign_key_id: Option<&str>,
    ) -> Result<Vec<BlobMeta>> {
        require("user_id", user_id)?;
        let (key_meta, key) = self.download_key(key_id).await?;
        if key_meta.key_type != KeyType::Symmetric {
            return Err(Error::InvalidKeyType(format!(
                "key {} is {} but blob encryption needs a symmetric key",
                key_id, key_meta.key_type
            )));
        }

        let mut encrypted = Vec::with_capacity(files.len());
        for file in files {
            let (name, data) = file.read().await?;
            let ciphertext = aes_cbc::encrypt(&data, &key)?;
            encrypted.push(BlobInput::Bytes {
                name,
                data: ciphertext,
            });
        }

        self.upload_blobs(&encrypted, user_id, Some(key_id), sign_key_id)
            .await
    }

    /// Fetch a blob and its metadata
    pub async fn download_blob(&self, blob_id: &str) -> Result<(BlobMeta, Vec<u8>)> {
        let meta = self.blob_meta(blob_id).await?;
        let data = self.blobs.download(&meta.storage_path()).await?;
        Ok((meta, data))
    }

    /// Fetch a blob and decrypt it with the key recorded in its metadata
    pub async fn download_decrypted_blob(&self, blob_id: &str) -> Result<(BlobMeta, Vec<u8>)> {
        let (meta, data) = self.download_blob(blob_id).await?;
        let key_id = meta
            .encryption_key_id
            .clone()
            .ok_or_else(|| Error::InvalidInput(format!("blob {} is not encrypted", blob_id)))?;

        let (_, key) = self.download_key(&key_id).await?;
        let plaintext = aes_cbc::decrypt(&data, &key)?;
        Ok((meta, plaintext))
    }

    /// Delete a blob's stored object and its metadata
    pub async fn delete_blob(&self, blob_id: &str) -> Result<()> {
        let meta = self.blob_meta(blob_id).await?;
        self.blobs.delete(&meta.storage_path()).await?;
        self.metadata.delete_blob(blob_id).await?;
        tracing::info!(blob_id, "Blob deleted");
        Ok(())
    }

    async fn blob_meta(&self, blob_id: &str) -> Result<BlobMeta> {
        require("blob_id", blob_id)?;
        self.metadata
            .get_blob(blob_id)
            .await?
            .ok_or_else(|| Error::StorageNotFound(format!("blob {}", blob_id)))
    }

    // ========================================================================
    // KEYS
    // ========================================================================

    /// Store one key artifact at `{keyPairId}/{keyId}-{keyType}` and record
    /// its metadata.
    pub async fn upload_key(
        &self,
        bytes: &[u8],
        user_id: &str,
        key_pair_id: &str,
        key_type: KeyType,
        algorithm: KeyAlgorithm,
        key_size: u32,
    ) -> Result<CryptoKeyMeta> {
        require("user_id", user_id)?;
        require("key_pair_id", key_pair_id)?;
        if bytes.is_empty() {
            return Err(Error::EmptyParameter("key bytes"));
        }

        let key_id = uuid::Uuid::new_v4().to_string();
        let path = key_path(key_pair_id, &key_id, key_type);

        if let Err(e) = self.keys.upload(&path, bytes).await {
            tracing::error!(error = %e, path = %path, "Key upload failed");
            compensate(self.keys.as_ref(), &path, &e).await;
            return Err(e);
        }

        let meta = CryptoKeyMeta {
            id: key_id,
            key_pair_id: key_pair_id.to_string(),
            key_type,
            algorithm,
            key_size,
            created_at: now_timestamp_millis(),
            user_id: user_id.to_string(),
        };

        if let Err(e) = self.metadata.insert_key(meta.clone()).await {
            tracing::error!(error = %e, key_id = %meta.id, "Recording key metadata failed");
            compensate(self.keys.as_ref(), &path, &e).await;
            return Err(e);
        }

        tracing::info!(
            key_id = %meta.id,
            key_pair_id,
            key_type = %key_type,
            algorithm = %algorithm,
            key_size,
            "Key stored"
        );
        Ok(meta)
    }

    /// Store both halves of a key pair under one new key-pair id.
    ///
    /// Returns `(private, public)`. If the public half fails, the private
    /// half is removed again.
    pub async fn upload_key_pair(
        &self,
        private: &[u8],
        public: &[u8],
        user_id: &str,
        algorithm: KeyAlgorithm,
        key_size: u32,
    ) -> Result<(CryptoKeyMeta, CryptoKeyMeta)> {
        let key_pair_id = uuid::Uuid::new_v4().to_string();

        let private_meta = self
            .upload_key(private, user_id, &key_pair_id, KeyType::Private, algorithm, key_size)
            .await?;

        match self
            .upload_key(public, user_id, &key_pair_id, KeyType::Public, algorithm, key_size)
            .await
        {
            Ok(public_meta) => Ok((private_meta, public_meta)),
            Err(e) => {
                tracing::error!(error = %e, key_pair_id = %key_pair_id, "Public key upload failed, removing private key");
                compensate(self.keys.as_ref(), &private_meta.storage_path(), &e).await;
                if let Err(meta_err) = self.metadata.delete_key(&private_meta.id).await {
                    tracing::warn!(key_id = %private_meta.id, error = %meta_err, cause = %e, "Failed to remove key metadata during rollback");
                }
                Err(e)
            }
        }
    }

    /// Generate a key in software and store it.
    ///
    /// | Algorithm | Sizes | Stored as |
    /// |-----------|-------|-----------|
    /// | AES | 128, 192, 256 | raw bytes, one `symmetric` record |
    /// | RSA | 2048, 3072, 4096 | PKCS#1 / SPKI PEM pair |
    /// | EC | 224, 256, 384, 521 | raw EC PEM pair |
    ///
    /// Asymmetric keys return `[private, public]`.
    pub async fn create_key(
        &self,
        user_id: &str,
        algorithm: KeyAlgorithm,
        key_size: u32,
    ) -> Result<Vec<CryptoKeyMeta>> {
        require("user_id", user_id)?;

        let material = generate_material(algorithm, key_size).await?;
        match material.as_slice() {
            [symmetric] => {
                let key_pair_id = uuid::Uuid::new_v4().to_string();
                let meta = self
                    .upload_key(
                        &symmetric.bytes,
                        user_id,
                        &key_pair_id,
                        symmetric.key_type,
                        algorithm,
                        key_size,
                    )
                    .await?;
                Ok(vec![meta])
            }
            [private, public] => {
                let (private_meta, public_meta) = self
                    .upload_key_pair(&private.bytes, &public.bytes, user_id, algorithm, key_size)
                    .await?;
                Ok(vec![private_meta, public_meta])
            }
            _ => Err(Error::Internal("unexpected key material layout".into())),
        }
    }

    /// Fetch a key artifact and its metadata
    pub async fn download_key(&self, key_id: &str) -> Result<(CryptoKeyMeta, Zeroizing<Vec<u8>>)> {
        let meta = self.key_meta(key_id).await?;
        let bytes = self.keys.download(&meta.storage_path()).await?;
        Ok((meta, Zeroizing::new(bytes)))
    }

    /// Delete a key artifact and its metadata
    pub async fn delete_key(&self, key_id: &str) -> Result<()> {
        let meta = self.key_meta(key_id).await?;
        self.keys.delete(&meta.storage_path()).await?;
        self.metadata.delete_key(key_id).await?;
        tracing::info!(key_id, key_type = %meta.key_type, "Key deleted");
        Ok(())
    }

    async fn key_meta(&self, key_id: &str) -> Result<CryptoKeyMeta> {
        require("key_id", key_id)?;
        self.metadata
            .get_key(key_id)
            .await?
            .ok_or_else(|| Error::StorageNotFound(format!("key {}", key_id)))
    }
}

/// Generate and serialize key material for `create_key`.
async fn generate_material(algorithm: KeyAlgorithm, key_size: u32) -> Result<Vec<KeyMaterial>> {
    match algorithm {
        KeyAlgorithm::Aes => {
            if !AES_KEY_BITS.contains(&key_size) {
                return Err(Error::UnsupportedKeySize {
                    algorithm: algorithm.to_string(),
                    size: key_size,
                });
            }
            let key = aes_cbc::generate_key(key_size as usize / 8);
            Ok(vec![KeyMaterial {
                bytes: Zeroizing::new(key.as_bytes().to_vec()),
                key_type: KeyType::Symmetric,
            }])
        }
        KeyAlgorithm::Rsa => {
            if !RSA_KEY_BITS.contains(&key_size) {
                return Err(Error::UnsupportedKeySize {
                    algorithm: algorithm.to_string(),
                    size: key_size,
                });
            }
            // Large RSA keys take seconds to generate.
            let (private, public) = tokio::task::spawn_blocking(move || {
                rsa_pkcs1::generate_key_pair(key_size as usize)
            })
            .await
            .map_err(|e| Error::Internal(format!("key generation task failed: {}", e)))??;

            Ok(vec![
                KeyMaterial {
                    bytes: Zeroizing::new(rsa_pkcs1::private_key_to_pem(&private)?.into_bytes()),
                    key_type: KeyType::Private,
                },
                KeyMaterial {
                    bytes: Zeroizing::new(rsa_pkcs1::public_key_to_pem(&public)?.into_bytes()),
                    key_type: KeyType::Public,
                },
            ])
        }
        KeyAlgorithm::Ec => {
            let curve = EcCurve::from_key_size(key_size)?;
            let (private, public) = ec::generate_key_pair(curve)?;
            Ok(vec![
                KeyMaterial {
                    bytes: Zeroizing::new(ec::private_key_to_pem(&private)?.into_bytes()),
                    key_type: KeyType::Private,
                },
                KeyMaterial {
                    bytes: Zeroizing::new(ec::public_key_to_pem(&public)?.into_bytes()),
                    key_type: KeyType::Public,
                },
            ])
        }
    }
}

/// Best-effort delete after a failure. Never fails; problems are logged.
async fn compensate(store: &dyn StorageConnector, path: &str, cause: &Error) {
    match store.delete(path).await {
        Ok(true) => tracing::info!(path, "Rolled back stored object"),
        Ok(false) => {}
        Err(e) => tracing::warn!(
            path,
            error = %e,
            cause = %cause,
            "Compensating delete failed, object may be orphaned"
        ),
    }
}

fn require(name: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::EmptyParameter(name));
    }
    Ok(())
}

fn extension_of(name: &str) -> String {
    std::path::Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

// ============================================================================
// TESTS
// ============================================================================
