//! Sealed message as sent over an untrusted network.
//!
//! The header fields travel unencrypted but are bound into the AEAD as
//! associated data, so any tampering voids the authentication tag. The IV
//! rides alongside as an AEAD input and the tag is appended to the
//! ciphertext; neither is part of the associated data.

use serde::{Deserialize, Serialize};

use pl_crypto::aead::IV_LEN;
use pl_crypto::keys::{DhPublic, FINGERPRINT_LEN};

/// Size of the authenticated header encoding: two u32 counters plus three
/// public-key fingerprints.
pub const HEADER_AAD_LEN: usize = 8 + 3 * FINGERPRINT_LEN;

/// One sealed message. Everything the receiving ratchet needs to classify
/// and decrypt it is in the header fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Sender's long-term identity public key.
    pub sender: DhPublic,
    /// Receiver's long-term identity public key.
    pub receiver: DhPublic,
    /// Sender's current ephemeral ratchet public key.
    pub next_ratchet: DhPublic,
    /// Position of this message in the sender's counter sequence (1-based).
    pub counter: u32,
    /// Sender's counter value at its most recent DH ratchet step. Counters
    /// below this belong to the previous DH epoch.
    pub last_update: u32,
    /// AEAD IV, fresh per message.
    #[serde(with = "pl_crypto::b64")]
    pub iv: [u8; IV_LEN],
    /// Sealed payload with the authentication tag appended.
    #[serde(with = "pl_crypto::b64::vec")]
    pub ciphertext: Vec<u8>,
}

impl Message {
    /// Encode the non-ciphertext fields into the fixed-layout byte string
    /// used as AEAD associated data:
    ///
    /// `counter (u32 LE) || last_update (u32 LE) || sender fp || receiver fp || next_ratchet fp`
    pub fn additional_data(&self) -> [u8; HEADER_AAD_LEN] {
        let mut buf = [0u8; HEADER_AAD_LEN];
        buf[..4].copy_from_slice(&self.counter.to_le_bytes());
        buf[4..8].copy_from_slice(&self.last_update.to_le_bytes());
        buf[8..8 + FINGERPRINT_LEN].copy_from_slice(&self.sender.fingerprint());
        buf[8 + FINGERPRINT_LEN..8 + 2 * FINGERPRINT_LEN]
            .copy_from_slice(&self.receiver.fingerprint());
        buf[8 + 2 * FINGERPRINT_LEN..].copy_from_slice(&self.next_ratchet.fingerprint());
        buf
    }
}
