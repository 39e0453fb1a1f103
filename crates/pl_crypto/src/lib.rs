//! pl_crypto — Parley cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Secret-carrying types cannot be cloned casually; duplication is an
//!   explicit, accountable operation.
//!
//! # Module layout
//! - `keys`  — X25519 DH keypairs, public-key fingerprints, symmetric chain keys
//! - `kdf`   — labeled one-way derivation (HMAC-SHA256) + multi-input combiner (HKDF-SHA256)
//! - `aead`  — XChaCha20-Poly1305 seal/open with a detached IV
//! - `b64`   — serde helpers for base64url byte fields
//! - `error` — unified error type

pub mod aead;
pub mod b64;
pub mod error;
pub mod kdf;
pub mod keys;

pub use error::CryptoError;
pub use keys::{DhKeyPair, DhPublic, SymmetricKey, FINGERPRINT_LEN};
