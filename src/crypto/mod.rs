//! # Cryptography Module
//!
//! Software implementations of every algorithm the vault uses. All functions
//! are pure over caller-supplied keys; nothing here holds shared state.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC LAYER                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐    │
//! │  │  aes_cbc         │   │  rsa_pkcs1       │   │  ec              │    │
//! │  │                  │   │                  │   │                  │    │
//! │  │ • AES-128/192/256│   │ • PKCS1v15 enc   │   │ • ECDSA P-224 to │    │
//! │  │ • CBC, random IV │   │ • PKCS1v15 sig   │   │   P-521          │    │
//! │  │ • raw key files  │   │ • PKCS#1/#8 PEM  │   │ • raw PEM format │    │
//! │  └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘    │
//! │           │                      │                      │              │
//! │           ▼                      └──────────┬───────────┘              │
//! │  ┌──────────────────┐                       ▼                          │
//! │  │  padding         │             ┌──────────────────┐                 │
//! │  │  (PKCS#7)        │             │  signature_file  │                 │
//! │  └──────────────────┘             │  (hex text)      │                 │
//! │                                   └──────────────────┘                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Notes |
//! |-----------|---------|-------|
//! | AES-CBC + PKCS#7 | Blob encryption | No MAC, see `aes_cbc` |
//! | RSA PKCS1v15 | Key wrapping, signatures | SHA-256 digests |
//! | ECDSA | Signatures | SHA-256 digests, fixed-width `r \|\| s` |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: symmetric keys and EC scalars are zeroized on drop
//! 2. **Secure Random**: keys and IVs come from `rand::rngs::OsRng`
//! 3. **No Authentication**: AES-CBC output carries no integrity tag

pub mod aes_cbc;
pub mod ec;
pub mod padding;
pub mod rsa_pkcs1;
pub mod signature_file;

pub use aes_cbc::{SymmetricKey, BLOCK_SIZE as AES_BLOCK_SIZE, VALID_KEY_SIZES as AES_KEY_SIZES};
pub use ec::{EcCurve, EcPrivateKey, EcPublicKey, EcSigner};
pub use rsa_pkcs1::RsaCipher;
pub use rsa::{RsaPrivateKey, RsaPublicKey};
