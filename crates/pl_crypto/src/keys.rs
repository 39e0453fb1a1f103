//! Key material: X25519 DH keypairs, public-key fingerprints, and the
//! symmetric keys the ratchet chains are built from.
//!
//! Every secret-carrying type zeroizes on drop. `SymmetricKey` is
//! deliberately not `Clone`: the only way to duplicate key material is an
//! explicit [`SymmetricKey::duplicate`], so every copy stays accountable to
//! a zeroizing owner.

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Length in bytes of a public-key fingerprint (BLAKE3 output).
pub const FINGERPRINT_LEN: usize = 32;

// ── Public key ───────────────────────────────────────────────────────────────

/// 32-byte X25519 public key. Hashable so it can key per-peer session maps;
/// base64url on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DhPublic(#[serde(with = "crate::b64")] pub [u8; 32]);

impl DhPublic {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("public key must be 32 bytes".into()))?;
        Ok(Self(arr))
    }

    /// Canonical fingerprint: BLAKE3 of the raw public key bytes.
    /// Used as the key's identifier in authenticated header bytes.
    pub fn fingerprint(&self) -> [u8; FINGERPRINT_LEN] {
        blake3::hash(&self.0).into()
    }

    /// Human-readable fingerprint for manual verification: the first
    /// 20 bytes (160 bits) of the BLAKE3 hash, hex-encoded in groups of 4.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn display_fingerprint(&self) -> String {
        let fp = self.fingerprint();
        let hex = hex::encode(&fp[..20]);
        hex.chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<X25519Public> for DhPublic {
    fn from(public: X25519Public) -> Self {
        Self(*public.as_bytes())
    }
}

// ── DH keypair ───────────────────────────────────────────────────────────────

/// X25519 keypair, used both for long-term identities and per-epoch ratchet
/// keys. The secret half is stored as raw bytes so it can be wiped in place
/// when a ratchet step rotates it out.
#[derive(Serialize, Deserialize, ZeroizeOnDrop)]
pub struct DhKeyPair {
    #[serde(with = "crate::b64")]
    secret: [u8; 32],
    #[zeroize(skip)]
    public: DhPublic,
}

impl DhKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = DhPublic::from(X25519Public::from(&secret));
        Self {
            secret: secret.to_bytes(),
            public,
        }
    }

    pub fn public(&self) -> DhPublic {
        self.public
    }

    /// X25519 group operation with a peer's public key. The output is raw
    /// shared-secret bytes; callers fold it through the KDF before use.
    pub fn diffie_hellman(&self, peer: &DhPublic) -> SymmetricKey {
        let secret = StaticSecret::from(self.secret);
        let shared = secret.diffie_hellman(&X25519Public::from(peer.0));
        SymmetricKey::from_bytes(*shared.as_bytes())
    }

    /// Wipe the secret half in place. The public half stays readable; DH
    /// against a wiped secret yields garbage, never a panic.
    pub fn zeroize_secret(&mut self) {
        self.secret.zeroize();
    }
}

// ── Symmetric key ────────────────────────────────────────────────────────────

/// 32-byte symmetric key: root keys, chain keys, message keys, check tags.
/// Zeroized on drop; compared in constant time.
#[derive(Serialize, Deserialize, ZeroizeOnDrop)]
pub struct SymmetricKey(#[serde(with = "crate::b64")] [u8; 32]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Independent copy with the same value. Each copy zeroizes on its own
    /// drop, so snapshots and live state never alias.
    pub fn duplicate(&self) -> Self {
        Self(self.0)
    }
}

/// Key bytes never reach log output.
impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

impl PartialEq for SymmetricKey {
    /// Constant-time comparison to prevent timing side channels.
    fn eq(&self, other: &Self) -> bool {
        let mut diff = 0u8;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl Eq for SymmetricKey {}
