//! pl_proto — Wire types for Parley
//!
//! What an untrusted network sees: the sealed [`Message`] with its plaintext
//! (but authenticated) ratchet header. Serialisation is JSON with base64url
//! byte fields; the authenticated header bytes have a fixed binary layout
//! independent of the serialisation format.

pub mod message;

pub use message::{Message, HEADER_AAD_LEN};
