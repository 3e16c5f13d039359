//! # Symmetric Encryption
//!
//! AES-128/192/256 in CBC mode with PKCS#7 padding and a random IV.
//!
//! ## Wire Format
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────────────┐
//! │  IV (16 bytes)       │  CBC(key, IV, pad(plaintext))                │
//! └──────────────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! ## Known Limitation
//!
//! There is no MAC. Decrypting with the wrong key does not reliably fail: it
//! can return garbage whenever the final byte happens to look like valid
//! padding. Successful decryption says nothing about authenticity. The format
//! is kept as-is so existing ciphertexts stay readable.

use std::path::Path;

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::padding::{pad, unpad};
use crate::error::{Error, Result};

/// AES block size in bytes (also the IV size)
pub const BLOCK_SIZE: usize = 16;

/// Key sizes accepted by [`encrypt`] and [`decrypt`] (AES-128/192/256)
pub const VALID_KEY_SIZES: [usize; 3] = [16, 24, 32];

/// Raw symmetric key bytes
///
/// Zeroized when dropped. Whoever generates a key owns it: if it is not
/// persisted it cannot be recovered.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey(Vec<u8>);

impl SymmetricKey {
    /// Wrap existing key bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Key length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for a zero-length key
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey({} bytes)", self.0.len())
    }
}

/// Fill `size_bytes` bytes from the OS CSPRNG.
///
/// The size is not validated here; an unusable size surfaces from
/// [`encrypt`] / [`decrypt`].
pub fn generate_key(size_bytes: usize) -> SymmetricKey {
    let mut bytes = vec![0u8; size_bytes];
    OsRng.fill_bytes(&mut bytes);
    SymmetricKey(bytes)
}

/// Encrypt `plaintext`, returning `IV || ciphertext`.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    check_key(key)?;

    let mut iv = [0u8; BLOCK_SIZE];
    OsRng.fill_bytes(&mut iv);

    let padded = pad(plaintext, BLOCK_SIZE)?;
    let mut out = Vec::with_capacity(BLOCK_SIZE + padded.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&padded);

    let body = &mut out[BLOCK_SIZE..];
    match key.len() {
        16 => cbc_encrypt::<cbc::Encryptor<Aes128>>(key, &iv, body)?,
        24 => cbc_encrypt::<cbc::Encryptor<Aes192>>(key, &iv, body)?,
        _ => cbc_encrypt::<cbc::Encryptor<Aes256>>(key, &iv, body)?,
    }

    Ok(out)
}

/// Decrypt `IV || ciphertext` produced by [`encrypt`].
///
/// ## Errors
///
/// - `CiphertextTooShort` if the input is shorter than one block
/// - `InvalidKey` for an unusable key
/// - `DecryptionFailed` if the payload is not whole blocks
/// - `InvalidPadding` if the trailing padding does not validate
pub fn decrypt(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < BLOCK_SIZE {
        return Err(Error::CiphertextTooShort {
            len: ciphertext.len(),
            block_size: BLOCK_SIZE,
        });
    }
    check_key(key)?;

    let (iv, payload) = ciphertext.split_at(BLOCK_SIZE);
    if payload.len() % BLOCK_SIZE != 0 {
        return Err(Error::DecryptionFailed(format!(
            "payload of {} bytes is not a multiple of the block size",
            payload.len()
        )));
    }

    let mut buf = payload.to_vec();
    match key.len() {
        16 => cbc_decrypt::<cbc::Decryptor<Aes128>>(key, iv, &mut buf)?,
        24 => cbc_decrypt::<cbc::Decryptor<Aes192>>(key, iv, &mut buf)?,
        _ => cbc_decrypt::<cbc::Decryptor<Aes256>>(key, iv, &mut buf)?,
    }

    let plaintext = unpad(&buf, BLOCK_SIZE);
    buf.zeroize();
    plaintext
}

/// Write raw key bytes to `path`.
pub fn save_key_to_file(path: impl AsRef<Path>, key: &SymmetricKey) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, key.as_bytes()).map_err(|e| Error::WriteError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Read raw key bytes from `path`.
pub fn read_key_from_file(path: impl AsRef<Path>) -> Result<SymmetricKey> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path).map_err(|e| Error::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(SymmetricKey(bytes))
}

fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("empty AES key".into()));
    }
    if !VALID_KEY_SIZES.contains(&key.len()) {
        return Err(Error::InvalidKey(format!(
            "AES key must be 16, 24 or 32 bytes, got {}",
            key.len()
        )));
    }
    Ok(())
}

fn cbc_encrypt<M: KeyIvInit + BlockEncryptMut>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
    let mode = M::new_from_slices(key, iv).map_err(|e| Error::InvalidKey(e.to_string()))?;
    let len = buf.len();
    mode.encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| Error::EncryptionFailed("buffer is not block aligned".into()))?;
    Ok(())
}

fn cbc_decrypt<M: KeyIvInit + BlockDecryptMut>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()> {
    let mode = M::new_from_slices(key, iv).map_err(|e| Error::InvalidKey(e.to_string()))?;
    mode.decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| Error::DecryptionFailed("buffer is not block aligned".into()))?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
