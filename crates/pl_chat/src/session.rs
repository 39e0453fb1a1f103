//! Per-peer ratchet session.
//!
//! State separation:
//!   root chain — updated on every DH ratchet step
//!   send chain — updated once per outgoing message; absent means the next
//!                send must perform a DH step first
//!   recv chain — updated once per receivable counter
//!   skipped    — message keys derived ahead of time for counters that have
//!                not arrived yet; each is consumed at most once
//!
//! The receive path is a two-phase commit. Every mutation runs against live
//! state after a snapshot is taken; nothing becomes visible unless the AEAD
//! tag verifies. A tampered header can coerce tentative transitions, but a
//! failed open restores the snapshot and zeroizes everything derived along
//! the way.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use zeroize::Zeroizing;

use pl_crypto::{aead, kdf, CryptoError, DhKeyPair, DhPublic, SymmetricKey};
use pl_proto::Message;

use crate::error::ChatError;
use crate::handshake;

// ── Skip policy ──────────────────────────────────────────────────────────────

/// Bounds on receive-side key derivation. A header can claim an arbitrary
/// counter; without a cap a peer could demand unbounded key derivation and
/// cache growth from a single forged message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RatchetPolicy {
    /// Largest forward counter jump a single message may demand.
    pub max_skip: u32,
    /// Upper bound on cached skipped keys across all epochs.
    pub max_cached_keys: usize,
}

impl Default for RatchetPolicy {
    fn default() -> Self {
        Self {
            max_skip: 256,
            max_cached_keys: 1024,
        }
    }
}

// ── Session state ────────────────────────────────────────────────────────────

/// Complete ratchet state for one peer. All key-holding fields zeroize on
/// drop, so tearing a session down is just dropping it.
#[derive(Serialize, Deserialize)]
pub struct Session {
    /// Our current ephemeral DH keypair. Regenerated on each send-side DH
    /// step; its secret is wiped once a receive-side step retires it.
    my_ratchet: DhKeyPair,
    /// Peer's current ephemeral DH public key. `None` until the peer's
    /// ephemeral is learned (initiator before finalize).
    peer_ratchet: Option<DhPublic>,
    root_chain: Option<SymmetricKey>,
    send_chain: Option<SymmetricKey>,
    recv_chain: Option<SymmetricKey>,
    /// counter → message key, for counters skipped by out-of-order arrival.
    skipped: HashMap<u32, SymmetricKey>,
    send_counter: u32,
    recv_counter: u32,
    /// Our send counter at our most recent DH step; sent in every header.
    last_update: u32,
    policy: RatchetPolicy,
}

/// Restorable view of the state a receive may mutate. Chain keys are
/// duplicates, so the live state can advance freely; on commit the
/// duplicates drop (zeroizing the superseded values), on rollback they move
/// back in.
struct Snapshot {
    root_chain: Option<SymmetricKey>,
    recv_chain: Option<SymmetricKey>,
    recv_counter: u32,
    peer_ratchet: Option<DhPublic>,
}

impl Session {
    pub(crate) fn new(policy: RatchetPolicy) -> Self {
        Self {
            my_ratchet: DhKeyPair::generate(),
            peer_ratchet: None,
            root_chain: None,
            send_chain: None,
            recv_chain: None,
            skipped: HashMap::new(),
            send_counter: 0,
            recv_counter: 0,
            last_update: 0,
            policy,
        }
    }

    /// Our current ephemeral public key, as carried in outgoing headers.
    pub fn ratchet_public(&self) -> DhPublic {
        self.my_ratchet.public()
    }

    pub fn send_counter(&self) -> u32 {
        self.send_counter
    }

    pub fn recv_counter(&self) -> u32 {
        self.recv_counter
    }

    /// Number of skipped message keys currently cached.
    pub fn cached_keys(&self) -> usize {
        self.skipped.len()
    }

    pub(crate) fn set_peer_ratchet(&mut self, peer_ephemeral: DhPublic) {
        self.peer_ratchet = Some(peer_ephemeral);
    }

    // ── Handshake ────────────────────────────────────────────────────────

    /// Run key agreement and seed the chains. Returns the check tag for
    /// out-of-band verification.
    ///
    /// The initiator starts with a seeded send chain (its first send
    /// advances symmetrically); the responder leaves it absent so its first
    /// send performs a DH step, carrying fresh ephemeral material.
    pub(crate) fn establish(
        &mut self,
        identity: &DhKeyPair,
        peer_identity: &DhPublic,
        initiator: bool,
    ) -> Result<SymmetricKey, ChatError> {
        let peer_ephemeral = self
            .peer_ratchet
            .ok_or_else(|| CryptoError::InvalidKey("peer ephemeral not set".into()))?;

        let root = if initiator {
            handshake::agree_initiator(identity, &self.my_ratchet, peer_identity, &peer_ephemeral)?
        } else {
            handshake::agree_responder(identity, &self.my_ratchet, peer_identity, &peer_ephemeral)?
        };
        let tag = handshake::check_tag(&root)?;

        self.recv_chain = Some(root.duplicate());
        if initiator {
            self.send_chain = Some(root.duplicate());
        }
        self.root_chain = Some(root);
        Ok(tag)
    }

    // ── Send path ────────────────────────────────────────────────────────

    /// Advance the sending ratchet one message and seal `plaintext`.
    pub(crate) fn seal(
        &mut self,
        sender: DhPublic,
        receiver: DhPublic,
        plaintext: &[u8],
    ) -> Result<Message, ChatError> {
        match self.send_chain.take() {
            Some(chain) => {
                self.send_chain = Some(kdf::derive(&chain, kdf::CHAIN_LABEL)?);
                // prior chain key drops here, zeroized
            }
            None => self.dh_step_send()?,
        }
        self.send_counter += 1;

        let chain = self.current_send_chain()?;
        let msg_key = kdf::derive(chain, kdf::KEY_LABEL)?;

        let mut message = Message {
            sender,
            receiver,
            next_ratchet: self.my_ratchet.public(),
            counter: self.send_counter,
            last_update: self.last_update,
            iv: aead::generate_iv(),
            ciphertext: Vec::new(),
        };
        message.ciphertext = aead::seal(
            &msg_key,
            plaintext,
            &message.additional_data(),
            &message.iv,
        )?;
        trace!(
            target: "parley::ratchet",
            counter = message.counter,
            last_update = message.last_update,
            "sealed outgoing message"
        );
        Ok(message)
    }

    /// Send-side DH step: mix a fresh ephemeral into the root and reseed the
    /// send chain. `last_update` becomes the counter of the message about to
    /// be sent, marking it as the first of a new DH epoch.
    fn dh_step_send(&mut self) -> Result<(), CryptoError> {
        let peer = self
            .peer_ratchet
            .ok_or_else(|| CryptoError::InvalidKey("peer ephemeral not set".into()))?;
        let root = self
            .root_chain
            .take()
            .ok_or_else(|| CryptoError::InvalidKey("session not established".into()))?;

        let stepped = kdf::derive(&root, kdf::ROOT_LABEL)?;
        drop(root);

        self.my_ratchet = DhKeyPair::generate();
        let dh = self.my_ratchet.diffie_hellman(&peer);
        let new_root = kdf::combine(&[&stepped, &dh])?;
        self.send_chain = Some(kdf::derive(&new_root, kdf::CHAIN_LABEL)?);
        self.root_chain = Some(new_root);
        self.last_update = self.send_counter + 1;

        debug!(
            target: "parley::ratchet",
            last_update = self.last_update,
            "send-side DH ratchet step"
        );
        Ok(())
    }

    // ── Receive path ─────────────────────────────────────────────────────

    /// Classify an incoming message, derive its key, verify, and either
    /// commit the advanced state or restore the snapshot. Failures are
    /// uniformly [`ChatError::AuthFailed`] and leave no observable change.
    pub(crate) fn open(&mut self, message: &Message) -> Result<Zeroizing<Vec<u8>>, ChatError> {
        let n = message.counter;
        let u = message.last_update;
        let r = self.recv_counter;

        // Late arrival, or a duplicate of something already decrypted:
        // served from the cache only, no chain movement.
        if n <= r {
            return self.open_late(message);
        }

        // A header cannot open an epoch after its own message, and the skip
        // it demands must stay inside policy. Checked before any mutation.
        if u > n {
            return Err(ChatError::AuthFailed);
        }
        let skip = n - r - 1;
        if skip > self.policy.max_skip
            || self.skipped.len() + skip as usize > self.policy.max_cached_keys
        {
            debug!(
                target: "parley::ratchet",
                counter = n,
                skip,
                "skip policy exceeded, rejecting message"
            );
            return Err(ChatError::AuthFailed);
        }

        let snapshot = self.snapshot();
        let mut added: Vec<u32> = Vec::new();

        match self.advance_and_open(message, &mut added) {
            Ok((plaintext, dh_stepped)) => {
                self.commit(snapshot, n, dh_stepped);
                Ok(plaintext)
            }
            Err(_) => {
                self.rollback(snapshot, &added);
                Err(ChatError::AuthFailed)
            }
        }
    }

    /// Decrypt a counter at or below `recv_counter` from the skipped-key
    /// cache. The key is removed only after a successful open, so a failed
    /// attempt does not burn it.
    fn open_late(&mut self, message: &Message) -> Result<Zeroizing<Vec<u8>>, ChatError> {
        let key = self
            .skipped
            .get(&message.counter)
            .ok_or(ChatError::AuthFailed)?;
        let plaintext = aead::open(key, &message.ciphertext, &message.additional_data(), &message.iv)
            .map_err(|_| ChatError::AuthFailed)?;
        self.skipped.remove(&message.counter);
        trace!(
            target: "parley::ratchet",
            counter = message.counter,
            "consumed cached key for late message"
        );
        Ok(plaintext)
    }

    /// Tentatively advance the receiving ratchet up to `message.counter`,
    /// caching keys for every counter passed over, and attempt the open.
    /// Runs against live state; the caller holds the snapshot.
    fn advance_and_open(
        &mut self,
        message: &Message,
        added: &mut Vec<u32>,
    ) -> Result<(Zeroizing<Vec<u8>>, bool), CryptoError> {
        let n = message.counter;
        let u = message.last_update;
        let r = self.recv_counter;
        let mut dh_stepped = false;

        if u > r {
            // Counters below u still belong to the previous DH epoch.
            self.cache_range(r + 1, u, added)?;
            self.dh_step_recv(&message.next_ratchet)?;
            dh_stepped = true;
            // The fresh chain's first key belongs to counter u. When u == n
            // that IS the message key and the chain stays put.
            if u != n {
                let key = kdf::derive(self.current_recv_chain()?, kdf::KEY_LABEL)?;
                self.skipped.insert(u, key);
                added.push(u);
                self.cache_range(u + 1, n, added)?;
                self.advance_recv_chain()?;
            }
        } else {
            self.cache_range(r + 1, n, added)?;
            self.advance_recv_chain()?;
        }

        let msg_key = kdf::derive(self.current_recv_chain()?, kdf::KEY_LABEL)?;
        let plaintext = aead::open(
            &msg_key,
            &message.ciphertext,
            &message.additional_data(),
            &message.iv,
        )?;
        Ok((plaintext, dh_stepped))
    }

    /// Advance the receive chain once per counter in `[from, to)`, caching
    /// each derived message key.
    fn cache_range(
        &mut self,
        from: u32,
        to: u32,
        added: &mut Vec<u32>,
    ) -> Result<(), CryptoError> {
        for counter in from..to {
            self.advance_recv_chain()?;
            let key = kdf::derive(self.current_recv_chain()?, kdf::KEY_LABEL)?;
            self.skipped.insert(counter, key);
            added.push(counter);
        }
        if to > from {
            trace!(
                target: "parley::ratchet",
                from,
                to,
                "cached skipped message keys"
            );
        }
        Ok(())
    }

    /// Receive-side DH step: adopt the peer's new ephemeral and reseed the
    /// receive chain from the advanced root.
    fn dh_step_recv(&mut self, next_ratchet: &DhPublic) -> Result<(), CryptoError> {
        let root = self
            .root_chain
            .take()
            .ok_or_else(|| CryptoError::InvalidKey("session not established".into()))?;
        let stepped = kdf::derive(&root, kdf::ROOT_LABEL)?;
        drop(root);

        self.peer_ratchet = Some(*next_ratchet);
        let dh = self.my_ratchet.diffie_hellman(next_ratchet);
        let new_root = kdf::combine(&[&stepped, &dh])?;
        self.recv_chain = Some(kdf::derive(&new_root, kdf::CHAIN_LABEL)?);
        self.root_chain = Some(new_root);

        debug!(target: "parley::ratchet", "receive-side DH ratchet step");
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            root_chain: self.root_chain.as_ref().map(SymmetricKey::duplicate),
            recv_chain: self.recv_chain.as_ref().map(SymmetricKey::duplicate),
            recv_counter: self.recv_counter,
            peer_ratchet: self.peer_ratchet,
        }
    }

    fn commit(&mut self, snapshot: Snapshot, counter: u32, dh_stepped: bool) {
        self.recv_counter = counter;
        if dh_stepped {
            // The peer opened a new DH epoch. Our send chain and ratchet key
            // are retired; the next send regenerates both.
            self.send_chain = None;
            self.my_ratchet.zeroize_secret();
        }
        // Snapshot duplicates of the superseded chains drop here, zeroized.
        drop(snapshot);
    }

    fn rollback(&mut self, snapshot: Snapshot, added: &[u32]) {
        let Snapshot {
            root_chain,
            recv_chain,
            recv_counter,
            peer_ratchet,
        } = snapshot;
        // Tentative chain values drop as the snapshot moves back in.
        self.root_chain = root_chain;
        self.recv_chain = recv_chain;
        self.recv_counter = recv_counter;
        self.peer_ratchet = peer_ratchet;
        for counter in added {
            self.skipped.remove(counter);
        }
        debug!(
            target: "parley::ratchet",
            entries = added.len(),
            "rolled back failed receive"
        );
    }

    fn current_send_chain(&self) -> Result<&SymmetricKey, CryptoError> {
        self.send_chain
            .as_ref()
            .ok_or_else(|| CryptoError::InvalidKey("send chain not established".into()))
    }

    fn current_recv_chain(&self) -> Result<&SymmetricKey, CryptoError> {
        self.recv_chain
            .as_ref()
            .ok_or_else(|| CryptoError::InvalidKey("receive chain not established".into()))
    }

    fn advance_recv_chain(&mut self) -> Result<(), CryptoError> {
        let next = kdf::derive(self.current_recv_chain()?, kdf::CHAIN_LABEL)?;
        self.recv_chain = Some(next);
        Ok(())
    }
}
