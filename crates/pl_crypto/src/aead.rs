//! Authenticated Encryption with Associated Data
//!
//! XChaCha20-Poly1305. Key: 32 bytes. IV: 24 bytes (random). Tag: 16 bytes,
//! appended to the ciphertext.
//!
//! The IV is detached rather than prepended: message headers carry it as a
//! named field, so seal/open take it explicitly.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::SymmetricKey;

/// AEAD IV length in bytes (XChaCha20 extended nonce).
pub const IV_LEN: usize = 24;

/// Uniformly random IV from the OS RNG.
pub fn generate_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    rand::rngs::OsRng.fill_bytes(&mut iv);
    iv
}

/// Encrypt `plaintext` under a one-time message key.
/// `aad` is authenticated but not encrypted.
pub fn seal(
    key: &SymmetricKey,
    plaintext: &[u8],
    aad: &[u8],
    iv: &[u8; IV_LEN],
) -> Result<Vec<u8>, CryptoError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::AeadSeal)?;
    cipher
        .encrypt(
            XNonce::from_slice(iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadSeal)
}

/// Decrypt and verify. Fails on any tag mismatch, including a mismatched
/// `aad` or `iv`.
pub fn open(
    key: &SymmetricKey,
    ciphertext: &[u8],
    aad: &[u8],
    iv: &[u8; IV_LEN],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let cipher =
        XChaCha20Poly1305::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::AeadOpen)?;
    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::AeadOpen)?;
    Ok(Zeroizing::new(plaintext))
}
