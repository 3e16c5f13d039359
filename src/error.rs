//! # Error Handling
//!
//! Error types shared by every component of the vault.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Validation (100)   - rejected before any I/O happens              │
//! │  ├── IO (200)           - local file reads and writes                  │
//! │  ├── Crypto (300)       - cipher construction, padding, keys           │
//! │  ├── External tool (400)- pkcs11-tool / openssl failures               │
//! │  ├── Not found (500)    - missing input files, tokens, objects         │
//! │  ├── Storage (600)      - blob / key-vault connectors, metadata        │
//! │  └── Internal (900)     - serialization and invariants                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lower layers (ciphers, the token adapter, storage connectors) always
//! return errors; only the `vault` binary turns an error into a process exit.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Empty/missing parameter, bad key size, bad curve, bad object type
    Validation,
    /// File read/write failure
    Io,
    /// Cipher construction, padding or key failure
    Crypto,
    /// Non-zero exit or spawn failure of an external tool
    ExternalTool,
    /// Missing input file, token or token object
    NotFound,
    /// Storage connector or metadata failure
    Storage,
    /// Should not happen in normal operation
    Internal,
}

/// Main error type for the vault
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Validation Errors (100-199)
    // ========================================================================

    /// A required string parameter was empty
    #[error("Missing required parameter: {0}")]
    EmptyParameter(&'static str),

    /// Key size not supported for the algorithm
    #[error("Unsupported key size {size} for {algorithm}")]
    UnsupportedKeySize {
        /// Algorithm family the size was requested for
        algorithm: String,
        /// Requested size
        size: u32,
    },

    /// Elliptic curve not supported
    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// Token object type outside the allow-list
    #[error("Invalid object type '{0}' (expected one of privkey, pubkey, secrkey, cert, data)")]
    InvalidObjectType(String),

    /// Unknown key type
    #[error("Invalid key type: {0}")]
    InvalidKeyType(String),

    /// Unknown algorithm
    #[error("Invalid algorithm: {0}")]
    InvalidAlgorithm(String),

    /// Any other malformed argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // IO Errors (200-299)
    // ========================================================================

    /// Failed to read a local file
    #[error("Failed to read {path}: {reason}")]
    ReadError {
        /// File that was read
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// Failed to write a local file
    #[error("Failed to write {path}: {reason}")]
    WriteError {
        /// File that was written
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Invalid key material (size, encoding)
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// PKCS#7 padding did not validate
    #[error("Invalid padding")]
    InvalidPadding,

    /// Ciphertext shorter than one block (no room for the IV)
    #[error("Ciphertext too short: {len} bytes, need at least {block_size}")]
    CiphertextTooShort {
        /// Length of the rejected ciphertext
        len: usize,
        /// Cipher block size
        block_size: usize,
    },

    /// The operation needs a key that was not supplied
    #[error("No {0} key loaded")]
    MissingKey(&'static str),

    /// Decoded key is not of the expected algorithm
    #[error("Wrong key type: {0}")]
    WrongKeyType(String),

    /// Private key rejected before use (e.g. zero scalar)
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Signature bytes cannot be a signature for this key
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Key generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    // ========================================================================
    // External Tool Errors (400-499)
    // ========================================================================

    /// External tool exited unsuccessfully
    #[error("Command `{command}` failed (status {status:?}): {output}")]
    ExternalTool {
        /// Redacted command line
        command: String,
        /// Exit code, `None` when killed by a signal
        status: Option<i32>,
        /// Combined stdout and stderr
        output: String,
    },

    /// External tool could not be started
    #[error("Failed to start `{command}`: {reason}")]
    ProcessSpawn {
        /// Program that failed to start
        command: String,
        /// Underlying reason
        reason: String,
    },

    /// External tool did not finish before its deadline
    #[error("Command `{command}` timed out after {seconds}s")]
    Timeout {
        /// Redacted command line
        command: String,
        /// Deadline that elapsed
        seconds: u64,
    },

    // ========================================================================
    // Not Found Errors (500-599)
    // ========================================================================

    /// Input file does not exist
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// No token with this label
    #[error("Token not found: {0}")]
    TokenNotFound(String),

    /// No object with this label on the token
    #[error("Token object not found: {0}")]
    ObjectNotFound(String),

    // ========================================================================
    // Storage Errors (600-699)
    // ========================================================================

    /// Failed to write to a storage connector
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Failed to read from a storage connector
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Storage object does not exist
    #[error("Storage object not found: {0}")]
    StorageNotFound(String),

    /// Failed to delete from a storage connector
    #[error("Failed to delete from storage: {0}")]
    StorageDeleteError(String),

    /// Metadata repository failure
    #[error("Metadata error: {0}")]
    MetadataError(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Codes are organized by category:
    /// - 100-199: Validation
    /// - 200-299: IO
    /// - 300-399: Crypto
    /// - 400-499: External tool
    /// - 500-599: Not found
    /// - 600-699: Storage
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Validation (100-199)
            Error::EmptyParameter(_) => 100,
            Error::UnsupportedKeySize { .. } => 101,
            Error::UnsupportedCurve(_) => 102,
            Error::InvalidObjectType(_) => 103,
            Error::InvalidKeyType(_) => 104,
            Error::InvalidAlgorithm(_) => 105,
            Error::InvalidInput(_) => 106,

            // IO (200-299)
            Error::ReadError { .. } => 200,
            Error::WriteError { .. } => 201,

            // Crypto (300-399)
            Error::InvalidKey(_) => 300,
            Error::InvalidPadding => 301,
            Error::CiphertextTooShort { .. } => 302,
            Error::MissingKey(_) => 303,
            Error::WrongKeyType(_) => 304,
            Error::InvalidPrivateKey(_) => 305,
            Error::MalformedSignature(_) => 306,
            Error::EncryptionFailed(_) => 307,
            Error::DecryptionFailed(_) => 308,
            Error::SigningFailed(_) => 309,
            Error::KeyGenerationFailed(_) => 310,

            // External tool (400-499)
            Error::ExternalTool { .. } => 400,
            Error::ProcessSpawn { .. } => 401,
            Error::Timeout { .. } => 402,

            // Not found (500-599)
            Error::FileNotFound(_) => 500,
            Error::TokenNotFound(_) => 501,
            Error::ObjectNotFound(_) => 502,

            // Storage (600-699)
            Error::StorageWriteError(_) => 600,
            Error::StorageReadError(_) => 601,
            Error::StorageNotFound(_) => 602,
            Error::StorageDeleteError(_) => 603,
            Error::MetadataError(_) => 604,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self.code() {
            100..=199 => ErrorKind::Validation,
            200..=299 => ErrorKind::Io,
            300..=399 => ErrorKind::Crypto,
            400..=499 => ErrorKind::ExternalTool,
            500..=599 => ErrorKind::NotFound,
            600..=699 => ErrorKind::Storage,
            _ => ErrorKind::Internal,
        }
    }

    /// Check if a caller may reasonably retry the operation
    ///
    /// Token and OpenSSL invocations are never considered retryable: a
    /// hardware token is not assumed to be safe to drive twice.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::StorageWriteError(_) | Error::StorageReadError(_) | Error::StorageDeleteError(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(err: hex::FromHexError) -> Self {
        Error::InvalidInput(format!("invalid hex: {}", err))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(Error::EmptyParameter("label").code(), 100);
        assert_eq!(
            Error::ReadError {
                path: "x".into(),
                reason: "y".into()
            }
            .code(),
            200
        );
        assert_eq!(Error::InvalidPadding.code(), 301);
        assert_eq!(
            Error::ExternalTool {
                command: "pkcs11-tool".into(),
                status: Some(1),
                output: String::new()
            }
            .code(),
            400
        );
        assert_eq!(Error::FileNotFound("in.bin".into()).code(), 500);
        assert_eq!(Error::StorageNotFound("a/b".into()).code(), 602);
        assert_eq!(Error::Internal("test".into()).code(), 900);
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::UnsupportedKeySize {
                algorithm: "RSA".into(),
                size: 1234
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::InvalidObjectType("foo".into()).kind(), ErrorKind::Validation);
        assert_eq!(
            Error::CiphertextTooShort {
                len: 3,
                block_size: 16
            }
            .kind(),
            ErrorKind::Crypto
        );
        assert_eq!(
            Error::Timeout {
                command: "openssl".into(),
                seconds: 30
            }
            .kind(),
            ErrorKind::ExternalTool
        );
        assert_eq!(Error::TokenNotFound("MyToken".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::MetadataError("x".into()).kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_tool_errors_not_retryable() {
        let err = Error::ExternalTool {
            command: "pkcs11-tool -L".into(),
            status: Some(1),
            output: "CKR_DEVICE_ERROR".into(),
        };
        assert!(!err.is_retryable());
        assert!(!Error::InvalidPadding.is_retryable());
        assert!(Error::StorageWriteError("503".into()).is_retryable());
    }

    #[test]
    fn test_external_tool_message_includes_output() {
        let err = Error::ExternalTool {
            command: "pkcs11-tool --module m -L".into(),
            status: Some(2),
            output: "error: PKCS11 function C_GetSlotList failed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pkcs11-tool --module m -L"));
        assert!(msg.contains("C_GetSlotList"));
    }
}
