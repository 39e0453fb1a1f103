//! pl_chat — Double-ratchet sessions and the chat façade
//!
//! Forward-secure, end-to-end encrypted two-party messaging with key
//! compromise recovery and out-of-order delivery. Message keys evolve along
//! two axes:
//!
//!   - a DH *root* ratchet, advanced whenever a peer contributes a fresh
//!     ephemeral key (post-compromise recovery)
//!   - a symmetric *chain* ratchet, advanced once per message
//!     (forward secrecy)
//!
//! References:
//!   - Signal Double Ratchet spec: <https://signal.org/docs/specifications/doubleratchet/>
//!
//! # Module layout
//! - `chatter`   — participant façade: identity key + per-peer session map
//! - `handshake` — triple-DH key agreement seeding the initial root key
//! - `session`   — per-peer ratchet state machine with snapshot rollback
//! - `error`     — caller-visible error taxonomy

pub mod chatter;
pub mod error;
pub mod handshake;
pub mod session;

pub use chatter::Chatter;
pub use error::ChatError;
pub use session::{RatchetPolicy, Session};
