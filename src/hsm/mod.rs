//! # Hardware Token Module
//!
//! PKCS#11 token access through external tools.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       HSM ADAPTER                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Pkcs11Token (token.rs)                                                │
//! │  │  validates parameters, builds command lines                         │
//! │  │                                                                      │
//! │  ├── Pkcs11Uri (uri.rs)        key locator for the OpenSSL engine      │
//! │  ├── ProcessRunner (runner.rs) spawns pkcs11-tool / openssl            │
//! │  └── parser (parser.rs)        free-text output → Token, TokenObject   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod parser;
pub mod runner;
mod token;
mod types;
pub mod uri;

#[cfg(test)]
pub(crate) mod testing;

pub use runner::{ProcessCommand, ProcessOutput, ProcessRunner, SystemRunner};
pub use token::Pkcs11Token;
pub use types::{HsmKeyType, ObjectClass, ObjectType, Token, TokenObject, TokenState};
pub use uri::{Pkcs11Uri, UriKeyType};
