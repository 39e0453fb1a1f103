//! Chat participant façade.
//!
//! A [`Chatter`] owns one long-term identity keypair and a map of open
//! sessions, one per peer identity key. Handshakes, sends, and receives all
//! route through here; the ratchet mechanics live in [`crate::session`].
//!
//! Handshake choreography (initiator A, responder B):
//!   1. A: `initiate_handshake(B)` → A's ephemeral public key
//!   2. B: `return_handshake(A, a_eph)` → (B's ephemeral, check tag)
//!   3. A: `finalize_handshake(B, b_eph)` → check tag
//! Both tags must match when compared out of band.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use pl_crypto::{DhKeyPair, DhPublic, SymmetricKey};
use pl_proto::Message;

use crate::error::ChatError;
use crate::session::{RatchetPolicy, Session};

/// A chat participant: long-term identity plus per-peer ratchet sessions.
#[derive(Serialize, Deserialize)]
pub struct Chatter {
    identity: DhKeyPair,
    sessions: HashMap<DhPublic, Session>,
    policy: RatchetPolicy,
}

impl Chatter {
    /// Fresh participant with a newly generated identity keypair.
    pub fn new() -> Self {
        Self::with_policy(RatchetPolicy::default())
    }

    pub fn with_policy(policy: RatchetPolicy) -> Self {
        Self {
            identity: DhKeyPair::generate(),
            sessions: HashMap::new(),
            policy,
        }
    }

    /// Our long-term identity public key. Peers address us by this.
    pub fn identity(&self) -> DhPublic {
        self.identity.public()
    }

    /// Read access to the session with `peer`, if one is open.
    pub fn session(&self, peer: &DhPublic) -> Option<&Session> {
        self.sessions.get(peer)
    }

    /// Begin a handshake as the initiator. Returns our ephemeral public key
    /// for transmission to the peer.
    pub fn initiate_handshake(&mut self, peer: DhPublic) -> Result<DhPublic, ChatError> {
        if self.sessions.contains_key(&peer) {
            return Err(ChatError::SessionExists);
        }
        let session = Session::new(self.policy);
        let ephemeral = session.ratchet_public();
        self.sessions.insert(peer, session);
        debug!(target: "parley::session", peer = %peer.display_fingerprint(), "handshake initiated");
        Ok(ephemeral)
    }

    /// Answer a handshake as the responder. Performs key agreement
    /// immediately; returns our ephemeral public key and the check tag.
    pub fn return_handshake(
        &mut self,
        peer: DhPublic,
        peer_ephemeral: DhPublic,
    ) -> Result<(DhPublic, SymmetricKey), ChatError> {
        if self.sessions.contains_key(&peer) {
            return Err(ChatError::SessionExists);
        }
        let mut session = Session::new(self.policy);
        session.set_peer_ratchet(peer_ephemeral);
        let tag = session.establish(&self.identity, &peer, false)?;
        let ephemeral = session.ratchet_public();
        self.sessions.insert(peer, session);
        debug!(target: "parley::session", peer = %peer.display_fingerprint(), "handshake returned");
        Ok((ephemeral, tag))
    }

    /// Complete a handshake we initiated, once the peer's ephemeral key
    /// arrives. Returns the check tag.
    pub fn finalize_handshake(
        &mut self,
        peer: DhPublic,
        peer_ephemeral: DhPublic,
    ) -> Result<SymmetricKey, ChatError> {
        let session = self.sessions.get_mut(&peer).ok_or(ChatError::NoSession)?;
        session.set_peer_ratchet(peer_ephemeral);
        let tag = session.establish(&self.identity, &peer, true)?;
        debug!(target: "parley::session", peer = %peer.display_fingerprint(), "handshake finalized");
        Ok(tag)
    }

    /// Seal `plaintext` for `peer`, advancing the sending ratchet.
    pub fn send(&mut self, peer: DhPublic, plaintext: &[u8]) -> Result<Message, ChatError> {
        let sender = self.identity.public();
        let session = self.sessions.get_mut(&peer).ok_or(ChatError::NoSession)?;
        session.seal(sender, peer, plaintext)
    }

    /// Decrypt a message from whichever session matches its sender.
    /// Out-of-order and lost messages are tolerated; failures leave the
    /// session state untouched.
    pub fn receive(&mut self, message: &Message) -> Result<Zeroizing<Vec<u8>>, ChatError> {
        let session = self
            .sessions
            .get_mut(&message.sender)
            .ok_or(ChatError::NoSession)?;
        session.open(message)
    }

    /// Tear down the session with `peer`. Every live key in it is zeroized.
    pub fn end_session(&mut self, peer: &DhPublic) -> Result<(), ChatError> {
        match self.sessions.remove(peer) {
            Some(session) => {
                drop(session);
                debug!(target: "parley::session", peer = %peer.display_fingerprint(), "session ended");
                Ok(())
            }
            None => Err(ChatError::NoSession),
        }
    }
}

impl Default for Chatter {
    fn default() -> Self {
        Self::new()
    }
}
