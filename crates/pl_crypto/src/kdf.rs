//! Labeled key derivation for the ratchet chains.
//!
//! Two shapes:
//!   `derive`  — one-way step keyed by a single-byte domain label
//!               (HMAC-SHA256, per the Signal chain-key construction)
//!   `combine` — order-sensitive HKDF-SHA256 combiner folding one or more
//!               DH outputs (and a prior root) into a fresh root key
//!
//! Distinct labels yield independent outputs; none of the derivations are
//! invertible, which is what makes a chain advance a ratchet.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::SymmetricKey;

type HmacSha256 = Hmac<Sha256>;

/// Derives the check key from a fresh root, for out-of-band verification
/// of a finished handshake.
pub const HANDSHAKE_CHECK_LABEL: u8 = 0x11;

/// Ratchets the root key before a DH output is mixed in.
pub const ROOT_LABEL: u8 = 0x22;

/// Advances a send/receive chain by one message slot.
pub const CHAIN_LABEL: u8 = 0x33;

/// Derives a message key from a chain key; used to seal exactly one message.
pub const KEY_LABEL: u8 = 0x44;

/// One-way labeled derivation: HMAC-SHA256 over the label byte.
pub fn derive(key: &SymmetricKey, label: u8) -> Result<SymmetricKey, CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    mac.update(&[label]);
    let out: [u8; 32] = mac.finalize().into_bytes().into();
    Ok(SymmetricKey::from_bytes(out))
}

/// Order-sensitive combiner: the inputs are concatenated behind a 0xFF
/// domain-separation pad and expanded through HKDF-SHA256.
pub fn combine(parts: &[&SymmetricKey]) -> Result<SymmetricKey, CryptoError> {
    let mut ikm = Zeroizing::new(vec![0xFFu8; 32]);
    for part in parts {
        ikm.extend_from_slice(part.as_bytes());
    }

    let hk = Hkdf::<Sha256>::new(Some(b"parley-combine-v1"), &ikm);
    let mut out = [0u8; 32];
    hk.expand(b"root-key", &mut out)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(SymmetricKey::from_bytes(out))
}
