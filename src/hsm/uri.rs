//! PKCS#11 URIs used as OpenSSL key locators.
//!
//! `pkcs11:token=<label>;object=<label>;type=<public|private>;pin-value=<pin>`
//!
//! Attribute values are percent-encoded outside the unreserved set, so
//! labels containing `;`, `=`, spaces or non-ASCII text stay unambiguous.

use std::fmt::{self, Write as _};

/// Which half of a key pair the URI refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UriKeyType {
    /// Public key object
    Public,
    /// Private key object
    Private,
}

impl UriKeyType {
    fn as_str(&self) -> &'static str {
        match self {
            UriKeyType::Public => "public",
            UriKeyType::Private => "private",
        }
    }
}

/// Locator for a key object on a token
#[derive(Clone, PartialEq, Eq)]
pub struct Pkcs11Uri {
    token: String,
    object: String,
    key_type: UriKeyType,
    pin: Option<String>,
}

impl Pkcs11Uri {
    /// URI for `object` on `token`
    pub fn new(token: impl Into<String>, object: impl Into<String>, key_type: UriKeyType) -> Self {
        Self {
            token: token.into(),
            object: object.into(),
            key_type,
            pin: None,
        }
    }

    /// Attach the user PIN as `pin-value`
    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        let pin = pin.into();
        self.pin = (!pin.is_empty()).then_some(pin);
        self
    }

    /// Which key half this URI points at
    pub fn key_type(&self) -> UriKeyType {
        self.key_type
    }
}

impl fmt::Display for Pkcs11Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pkcs11:token={};object={};type={}",
            percent_encode(&self.token),
            percent_encode(&self.object),
            self.key_type.as_str()
        )?;
        if let Some(pin) = &self.pin {
            write!(f, ";pin-value={}", percent_encode(pin))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Pkcs11Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkcs11Uri")
            .field("token", &self.token)
            .field("object", &self.object)
            .field("key_type", &self.key_type)
            .field("pin", &self.pin.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Percent-encode everything outside RFC 3986 unreserved characters.
pub fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            let _ = write!(out, "%{:02X}", byte);
        }
    }
    out
}
