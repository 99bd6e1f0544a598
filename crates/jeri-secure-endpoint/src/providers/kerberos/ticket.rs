//! Tickets, authenticators and the sealing primitive they share.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::config::Mechanism;
use crate::domain::{HandshakeError, Principal, Timestamp};

const NONCE_LEN: usize = 12;

/// Fresh random 256-bit key.
pub fn generate_key() -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    rand::thread_rng().fill_bytes(&mut key[..]);
    key
}

/// Encrypt `plaintext` under `key`. Output is `nonce || ciphertext`.
pub(crate) fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| HandshakeError::Protocol("sealing failed".to_string()))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`seal`]. A wrong key or tampered input is an authentication failure.
pub(crate) fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Zeroizing<Vec<u8>>, HandshakeError> {
    if sealed.len() < NONCE_LEN {
        return Err(HandshakeError::Protocol("sealed record too short".to_string()));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    ChaCha20Poly1305::new(Key::from_slice(key))
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| HandshakeError::Authentication("cannot open sealed record".to_string()))
}

pub(crate) fn seal_record<T: Serialize>(
    key: &[u8; 32],
    record: &T,
) -> Result<Vec<u8>, HandshakeError> {
    let plain = Zeroizing::new(
        bincode::serialize(record).map_err(|e| HandshakeError::Protocol(e.to_string()))?,
    );
    seal(key, &plain)
}

pub(crate) fn open_record<T: DeserializeOwned>(
    key: &[u8; 32],
    sealed: &[u8],
) -> Result<T, HandshakeError> {
    let plain = open(key, sealed)?;
    bincode::deserialize(&plain).map_err(|e| HandshakeError::Protocol(e.to_string()))
}

/// Service ticket. Only the server (and the KDC) can open it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Ticket {
    #[zeroize(skip)]
    pub client: Principal,
    #[zeroize(skip)]
    pub server: Principal,
    pub session_key: [u8; 32],
    #[zeroize(skip)]
    pub issued_at: Timestamp,
    #[zeroize(skip)]
    pub expires_at: Timestamp,
    /// The client may delegate this ticket's authority to the server.
    pub forwardable: bool,
}

impl Ticket {
    pub fn seal(&self, server_key: &[u8; 32]) -> Result<Vec<u8>, HandshakeError> {
        seal_record(server_key, self)
    }

    pub fn open(sealed: &[u8], server_key: &[u8; 32]) -> Result<Self, HandshakeError> {
        open_record(server_key, sealed)
    }

    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.issued_at <= now && now < self.expires_at
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("client", &self.client)
            .field("server", &self.server)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("forwardable", &self.forwardable)
            .finish_non_exhaustive()
    }
}

/// Proof of session key possession, sealed under the session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Authenticator {
    pub client: Principal,
    pub timestamp: Timestamp,
    pub mechanism: Mechanism,
    pub delegation: bool,
}

/// Server reply body, sealed under the session key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ApReply {
    /// Echo of the authenticator timestamp.
    pub timestamp: Timestamp,
    /// Delegation the server granted: requested and the ticket is forwardable.
    pub delegation: bool,
}
