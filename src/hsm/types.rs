//! Token, object and key-type definitions for the PKCS#11 adapter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Initialization state of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenState {
    /// Slot has no initialized token (or the tool did not say)
    #[default]
    Uninitialized,
    /// Token reports `token initialized` in its flags
    Initialized,
}

/// A token slot as reported by the token tool
///
/// Fields the tool did not print are left empty and mean "unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Slot index as listed (`Slot 0 ...`)
    pub slot_index: Option<u64>,
    /// Slot id as printed in parentheses, e.g. `0x2d6b0b0a`
    pub slot_id: String,
    /// Token label
    pub label: String,
    /// Token manufacturer
    pub manufacturer: String,
    /// Token model
    pub model: String,
    /// Serial number
    pub serial_number: String,
    /// Initialization state
    pub state: TokenState,
}

impl Token {
    /// True if the token reports itself as initialized
    pub fn is_initialized(&self) -> bool {
        self.state == TokenState::Initialized
    }
}

/// Class of an object living on a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    /// Private key
    Private,
    /// Public key
    Public,
    /// Secret (symmetric) key
    Secret,
    /// Certificate
    Certificate,
    /// Data object
    Data,
}

/// A key or certificate on a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenObject {
    /// Object class from the section header
    pub class: ObjectClass,
    /// Key algorithm from the header (`RSA`, `EC`, `AES`), if printed
    pub key_type: Option<String>,
    /// Object label
    pub label: String,
    /// Usage flags, e.g. `sign`, `decrypt`
    pub usage: Vec<String>,
    /// Access flags, e.g. `sensitive`, `local`
    pub access: Vec<String>,
}

/// Object types accepted by `delete_object`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// `privkey`
    PrivateKey,
    /// `pubkey`
    PublicKey,
    /// `secrkey`
    SecretKey,
    /// `cert`
    Certificate,
    /// `data`
    Data,
}

impl ObjectType {
    /// Every allowed type
    pub const ALL: [ObjectType; 5] = [
        ObjectType::PrivateKey,
        ObjectType::PublicKey,
        ObjectType::SecretKey,
        ObjectType::Certificate,
        ObjectType::Data,
    ];

    /// Name passed to `--type`
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::PrivateKey => "privkey",
            ObjectType::PublicKey => "pubkey",
            ObjectType::SecretKey => "secrkey",
            ObjectType::Certificate => "cert",
            ObjectType::Data => "data",
        }
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidObjectType(s.to_string()))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key algorithms the token can generate and use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HsmKeyType {
    /// RSA key pair
    Rsa,
    /// EC key pair
    Ec,
}

impl HsmKeyType {
    /// `--key-type` argument for a key of `size` bits
    ///
    /// Fails with `UnsupportedKeySize` for anything other than EC
    /// 256/384/521 or RSA 2048/3072/4096.
    pub fn keygen_spec(&self, size: u32) -> Result<String> {
        match self {
            HsmKeyType::Ec => match size {
                256 => Ok("EC:secp256r1".to_string()),
                384 => Ok("EC:secp384r1".to_string()),
                521 => Ok("EC:secp521r1".to_string()),
                _ => Err(Error::UnsupportedKeySize {
                    algorithm: "EC".into(),
                    size,
                }),
            },
            HsmKeyType::Rsa => match size {
                2048 | 3072 | 4096 => Ok(format!("rsa:{}", size)),
                _ => Err(Error::UnsupportedKeySize {
                    algorithm: "RSA".into(),
                    size,
                }),
            },
        }
    }
}

impl FromStr for HsmKeyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "RSA" => Ok(HsmKeyType::Rsa),
            "EC" | "ECDSA" => Ok(HsmKeyType::Ec),
            _ => Err(Error::InvalidKeyType(s.to_string())),
        }
    }
}
