//! Handshake key agreement: three DH shares folded into the initial root.
//!
//! Both parties compute the same three X25519 outputs, each using whichever
//! private halves it owns:
//!
//!   dh1 = initiator identity  × responder ephemeral
//!   dh2 = initiator ephemeral × responder identity
//!   dh3 = initiator ephemeral × responder ephemeral
//!
//! The combine order is fixed (dh1, dh2, dh3) so both sides fold an
//! identical transcript into the root key. Mixing both identity keys
//! authenticates the session; mixing both ephemerals makes the root
//! unrecoverable once they are deleted.
//!
//! The check tag derived from the root is NOT secret once compared: it
//! exists for out-of-band verification (reading a short code over a call),
//! never for encryption.

use tracing::debug;

use pl_crypto::{kdf, CryptoError, DhKeyPair, DhPublic, SymmetricKey};

/// Initiator side: `identity`/`ephemeral` are ours, the peer values are the
/// responder's.
pub(crate) fn agree_initiator(
    identity: &DhKeyPair,
    ephemeral: &DhKeyPair,
    peer_identity: &DhPublic,
    peer_ephemeral: &DhPublic,
) -> Result<SymmetricKey, CryptoError> {
    let dh1 = identity.diffie_hellman(peer_ephemeral);
    let dh2 = ephemeral.diffie_hellman(peer_identity);
    let dh3 = ephemeral.diffie_hellman(peer_ephemeral);
    let root = kdf::combine(&[&dh1, &dh2, &dh3])?;
    debug!(target: "parley::handshake", "initiator key agreement complete");
    Ok(root)
}

/// Responder side. Mirrors the initiator's transcript exactly:
///   dh1 = initiator id × responder eph → ours: ephemeral × peer identity
///   dh2 = initiator eph × responder id → ours: identity × peer ephemeral
///   dh3 = eph × eph (commutative)
pub(crate) fn agree_responder(
    identity: &DhKeyPair,
    ephemeral: &DhKeyPair,
    peer_identity: &DhPublic,
    peer_ephemeral: &DhPublic,
) -> Result<SymmetricKey, CryptoError> {
    let dh1 = ephemeral.diffie_hellman(peer_identity);
    let dh2 = identity.diffie_hellman(peer_ephemeral);
    let dh3 = ephemeral.diffie_hellman(peer_ephemeral);
    let root = kdf::combine(&[&dh1, &dh2, &dh3])?;
    debug!(target: "parley::handshake", "responder key agreement complete");
    Ok(root)
}

/// Derive the out-of-band check tag from a freshly agreed root.
pub(crate) fn check_tag(root: &SymmetricKey) -> Result<SymmetricKey, CryptoError> {
    kdf::derive(root, kdf::HANDSHAKE_CHECK_LABEL)
}

/// Render a check tag for humans: the first 20 bytes, hex-encoded in groups
/// of 4 characters, same shape as a key fingerprint.
pub fn check_tag_display(tag: &SymmetricKey) -> String {
    let hex = hex::encode(&tag.as_bytes()[..20]);
    hex.chars()
        .collect::<Vec<_>>()
        .chunks(4)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ")
}
