use thiserror::Error;

use pl_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Operation referenced a peer with no open session.
    #[error("no open session for that peer")]
    NoSession,

    /// Handshake attempted while a session with the peer is already open.
    #[error("session with that peer already exists")]
    SessionExists,

    /// The message failed authentication. Deliberately silent about the
    /// cause: a bad tag, a consumed or missing cached key, and a malformed
    /// header are indistinguishable to the caller.
    #[error("message failed authentication")]
    AuthFailed,

    /// Primitive failure outside the receive path. Not reachable with
    /// well-formed 32-byte key material; the receive path maps all
    /// primitive failures to [`ChatError::AuthFailed`] instead.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
