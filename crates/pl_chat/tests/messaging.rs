//! End-to-end exercises of the double ratchet through the `Chatter` façade:
//! handshake agreement, reordering, epoch crossings, tampering rollback,
//! and key-exhaustion behavior.

use pl_chat::handshake::check_tag_display;
use pl_chat::{ChatError, Chatter, RatchetPolicy};
use pl_proto::Message;

/// Run the three-step handshake and assert both sides derived the same
/// check tag. Returns (initiator, responder).
fn handshake_pair() -> anyhow::Result<(Chatter, Chatter)> {
    let mut alice = Chatter::new();
    let mut bob = Chatter::new();

    let alice_eph = alice.initiate_handshake(bob.identity())?;
    let (bob_eph, bob_tag) = bob.return_handshake(alice.identity(), alice_eph)?;
    let alice_tag = alice.finalize_handshake(bob.identity(), bob_eph)?;

    assert_eq!(alice_tag, bob_tag, "handshake check tags must agree");
    assert_eq!(check_tag_display(&alice_tag), check_tag_display(&bob_tag));
    Ok((alice, bob))
}

#[test]
fn handshake_then_hello() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let msg = alice.send(bob.identity(), b"hello")?;
    let pt = bob.receive(&msg)?;
    assert_eq!(&*pt, b"hello");
    Ok(())
}

#[test]
fn ping_pong_across_epochs() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let m1 = alice.send(bob.identity(), b"m1")?;
    assert_eq!(&*bob.receive(&m1)?, b"m1");

    // Bob's first send performs a DH step (his send chain starts absent).
    let r1 = bob.send(alice.identity(), b"r1")?;
    assert_eq!(r1.last_update, 1);
    assert_eq!(&*alice.receive(&r1)?, b"r1");

    // Alice's reply opens her next epoch in turn.
    let m2 = alice.send(bob.identity(), b"m2")?;
    assert_eq!(m2.last_update, m2.counter);
    assert_eq!(&*bob.receive(&m2)?, b"m2");
    Ok(())
}

#[test]
fn out_of_order_within_epoch() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let m1 = alice.send(bob.identity(), b"m1")?;
    let m2 = alice.send(bob.identity(), b"m2")?;
    let m3 = alice.send(bob.identity(), b"m3")?;

    // Delivered m2, m3, m1: the gap caches m1's key, m3 is then in order,
    // and m1 finally drains the cache.
    assert_eq!(&*bob.receive(&m2)?, b"m2");
    assert_eq!(&*bob.receive(&m3)?, b"m3");
    assert_eq!(&*bob.receive(&m1)?, b"m1");

    let session = bob.session(&alice.identity()).unwrap();
    assert_eq!(session.recv_counter(), 3);
    assert_eq!(session.cached_keys(), 0);
    Ok(())
}

#[test]
fn counters_increase_monotonically() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    for expected in 1..=5u32 {
        let msg = alice.send(bob.identity(), b"tick")?;
        assert_eq!(msg.counter, expected);
        bob.receive(&msg)?;
        assert_eq!(
            bob.session(&alice.identity()).unwrap().recv_counter(),
            expected
        );
    }
    Ok(())
}

#[test]
fn dh_step_arrives_before_outstanding_reply() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let m1 = alice.send(bob.identity(), b"m1")?;
    let m2 = alice.send(bob.identity(), b"m2")?;
    bob.receive(&m1)?;
    bob.receive(&m2)?;

    // Bob's reply triggers his DH step; Alice adopts it.
    let r1 = bob.send(alice.identity(), b"r1")?;
    alice.receive(&r1)?;

    // Alice's next send opens her own new epoch (counter 3, last_update 3).
    let m3 = alice.send(bob.identity(), b"m3")?;
    assert_eq!(m3.last_update, 3);

    // In order after counter 2, so Bob ratchets without caching anything.
    assert_eq!(&*bob.receive(&m3)?, b"m3");
    let session = bob.session(&alice.identity()).unwrap();
    assert_eq!(session.cached_keys(), 0);
    assert_eq!(session.recv_counter(), 3);
    Ok(())
}

#[test]
fn skipped_key_survives_epoch_boundary() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let m1 = alice.send(bob.identity(), b"m1")?;
    let m2 = alice.send(bob.identity(), b"m2")?;
    bob.receive(&m1)?;

    let r1 = bob.send(alice.identity(), b"r1")?;
    alice.receive(&r1)?;

    // m3 opens Alice's new epoch while m2 from the old epoch is in flight.
    let m3 = alice.send(bob.identity(), b"m3")?;
    assert_eq!(&*bob.receive(&m3)?, b"m3");

    // m2's key was derived from the old receive chain and cached across
    // the DH boundary.
    assert_eq!(bob.session(&alice.identity()).unwrap().cached_keys(), 1);
    assert_eq!(&*bob.receive(&m2)?, b"m2");
    assert_eq!(bob.session(&alice.identity()).unwrap().cached_keys(), 0);
    Ok(())
}

#[test]
fn tampered_ciphertext_rolls_back_cleanly() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let m1 = alice.send(bob.identity(), b"m1")?;
    let m2 = alice.send(bob.identity(), b"m2")?;
    bob.receive(&m1)?;

    let before = serde_json::to_value(&bob)?;

    let mut forged = m2.clone();
    forged.ciphertext[0] ^= 0x01;
    assert!(matches!(bob.receive(&forged), Err(ChatError::AuthFailed)));

    // Structurally identical to the state before the failed call.
    assert_eq!(serde_json::to_value(&bob)?, before);

    // The genuine message still decrypts.
    assert_eq!(&*bob.receive(&m2)?, b"m2");
    Ok(())
}

#[test]
fn tampered_dh_step_rolls_back_cleanly() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let m1 = alice.send(bob.identity(), b"m1")?;
    bob.receive(&m1)?;

    // r1 carries Bob's fresh ratchet key; receiving it makes Alice DH-step.
    let r1 = bob.send(alice.identity(), b"r1")?;

    let before = serde_json::to_value(&alice)?;
    let mut forged = r1.clone();
    let last = forged.ciphertext.len() - 1;
    forged.ciphertext[last] ^= 0x80;
    assert!(matches!(alice.receive(&forged), Err(ChatError::AuthFailed)));
    assert_eq!(serde_json::to_value(&alice)?, before);

    assert_eq!(&*alice.receive(&r1)?, b"r1");
    Ok(())
}

#[test]
fn tampered_header_field_is_rejected() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let msg = alice.send(bob.identity(), b"hello")?;
    let mut forged = msg.clone();
    forged.next_ratchet = Chatter::new().identity();
    // The fingerprint is bound into the associated data, so the tag fails.
    assert!(matches!(bob.receive(&forged), Err(ChatError::AuthFailed)));

    assert_eq!(&*bob.receive(&msg)?, b"hello");
    Ok(())
}

#[test]
fn redelivery_after_decryption_fails() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let m1 = alice.send(bob.identity(), b"m1")?;
    let m2 = alice.send(bob.identity(), b"m2")?;
    let m3 = alice.send(bob.identity(), b"m3")?;

    bob.receive(&m2)?;
    bob.receive(&m3)?;
    bob.receive(&m1)?;

    // Every key involved has been consumed; replays must not decrypt.
    assert!(matches!(bob.receive(&m2), Err(ChatError::AuthFailed)));
    assert!(matches!(bob.receive(&m1), Err(ChatError::AuthFailed)));
    assert_eq!(bob.session(&alice.identity()).unwrap().recv_counter(), 3);
    Ok(())
}

#[test]
fn state_copy_cannot_decrypt_received_message() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let m1 = alice.send(bob.identity(), b"secret")?;
    assert_eq!(&*bob.receive(&m1)?, b"secret");

    // A full copy of Bob's state taken AFTER the receive holds no key
    // capable of decrypting counter 1 again.
    let snapshot = serde_json::to_value(&bob)?;
    let mut copy: Chatter = serde_json::from_value(snapshot)?;
    assert!(matches!(copy.receive(&m1), Err(ChatError::AuthFailed)));
    Ok(())
}

#[test]
fn skip_policy_bounds_are_honored() -> anyhow::Result<()> {
    let mut alice = Chatter::with_policy(RatchetPolicy {
        max_skip: 3,
        max_cached_keys: 1024,
    });
    let mut bob = Chatter::with_policy(RatchetPolicy {
        max_skip: 3,
        max_cached_keys: 1024,
    });

    let alice_eph = alice.initiate_handshake(bob.identity())?;
    let (bob_eph, _) = bob.return_handshake(alice.identity(), alice_eph)?;
    alice.finalize_handshake(bob.identity(), bob_eph)?;

    let m1 = alice.send(bob.identity(), b"m1")?;
    for _ in 0..4 {
        alice.send(bob.identity(), b"lost")?;
    }
    let m6 = alice.send(bob.identity(), b"m6")?;

    // A skip of 5 exceeds the bound of 3 and leaves no trace.
    assert!(matches!(bob.receive(&m6), Err(ChatError::AuthFailed)));
    let session = bob.session(&alice.identity()).unwrap();
    assert_eq!(session.recv_counter(), 0);
    assert_eq!(session.cached_keys(), 0);

    assert_eq!(&*bob.receive(&m1)?, b"m1");
    Ok(())
}

#[test]
fn handshake_errors() -> anyhow::Result<()> {
    let mut alice = Chatter::new();
    let mut bob = Chatter::new();
    let stranger = Chatter::new();

    alice.initiate_handshake(bob.identity())?;
    assert!(matches!(
        alice.initiate_handshake(bob.identity()),
        Err(ChatError::SessionExists)
    ));

    // Finalizing against a peer we never initiated with.
    assert!(matches!(
        alice.finalize_handshake(stranger.identity(), bob.identity()),
        Err(ChatError::NoSession)
    ));

    let alice_eph = bob.identity(); // any key works to occupy the slot
    bob.return_handshake(alice.identity(), alice_eph)?;
    assert!(matches!(
        bob.return_handshake(alice.identity(), alice_eph),
        Err(ChatError::SessionExists)
    ));
    Ok(())
}

#[test]
fn unknown_sender_is_no_session() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;
    let (mut carol, mut dave) = handshake_pair()?;

    let stray: Message = carol.send(dave.identity(), b"wrong network")?;
    assert!(matches!(bob.receive(&stray), Err(ChatError::NoSession)));

    // Everyone still works afterwards.
    let m = alice.send(bob.identity(), b"fine")?;
    assert_eq!(&*bob.receive(&m)?, b"fine");
    let m = carol.send(dave.identity(), b"also fine")?;
    assert_eq!(&*dave.receive(&m)?, b"also fine");
    Ok(())
}

#[test]
fn end_session_is_idempotent() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    let m1 = alice.send(bob.identity(), b"m1")?;
    bob.receive(&m1)?;

    bob.end_session(&alice.identity())?;
    assert!(matches!(
        bob.end_session(&alice.identity()),
        Err(ChatError::NoSession)
    ));

    // The session really is gone.
    let m2 = alice.send(bob.identity(), b"m2")?;
    assert!(matches!(bob.receive(&m2), Err(ChatError::NoSession)));
    assert!(matches!(
        bob.send(alice.identity(), b"ghost"),
        Err(ChatError::NoSession)
    ));
    Ok(())
}

#[test]
fn long_conversation_with_losses_and_reordering() -> anyhow::Result<()> {
    let (mut alice, mut bob) = handshake_pair()?;

    // Several epochs with interleaved turns, a lost message, and a swap.
    let a1 = alice.send(bob.identity(), b"a1")?;
    let a2 = alice.send(bob.identity(), b"a2")?;
    assert_eq!(&*bob.receive(&a2)?, b"a2"); // a1 delayed

    let b1 = bob.send(alice.identity(), b"b1")?;
    assert_eq!(&*alice.receive(&b1)?, b"b1");

    let a3 = alice.send(bob.identity(), b"a3")?;
    let a4 = alice.send(bob.identity(), b"a4")?;
    assert_eq!(&*bob.receive(&a4)?, b"a4"); // a3 delayed across the epoch
    assert_eq!(&*bob.receive(&a1)?, b"a1"); // old-epoch straggler
    assert_eq!(&*bob.receive(&a3)?, b"a3");

    let b2 = bob.send(alice.identity(), b"b2")?;
    assert_eq!(&*alice.receive(&b2)?, b"b2");

    let session = bob.session(&alice.identity()).unwrap();
    assert_eq!(session.recv_counter(), 4);
    assert_eq!(session.cached_keys(), 0);
    Ok(())
}
