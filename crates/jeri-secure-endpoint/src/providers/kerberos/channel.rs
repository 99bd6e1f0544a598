use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use zeroize::Zeroizing;

use super::config::Mechanism;
use crate::domain::Role;
use crate::providers::{read_frame, write_frame, ChannelError, SecureChannel};

type HmacSha256 = Hmac<Sha256>;

const TAG_LEN: usize = 32;

/// Request channel protected by a Kerberos session key.
///
/// Every message carries an implicit per-direction sequence number, so
/// replayed, reordered or reflected messages fail the integrity check.
pub struct KerberosChannel<S> {
    stream: S,
    key: Zeroizing<[u8; 32]>,
    mechanism: Mechanism,
    role: Role,
    send_seq: u64,
    recv_seq: u64,
}

impl<S> KerberosChannel<S> {
    pub fn new(stream: S, key: Zeroizing<[u8; 32]>, mechanism: Mechanism, role: Role) -> Self {
        Self {
            stream,
            key,
            mechanism,
            role,
            send_seq: 0,
            recv_seq: 0,
        }
    }

    pub fn mechanism(&self) -> Mechanism {
        self.mechanism
    }

    fn direction(sender: Role) -> u8 {
        match sender {
            Role::Client => 0,
            Role::Server => 1,
        }
    }

    fn peer(&self) -> Role {
        match self.role {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }

    fn nonce(sender: Role, seq: u64) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[0] = Self::direction(sender);
        nonce[4..].copy_from_slice(&seq.to_be_bytes());
        nonce
    }

    fn mac(&self, sender: Role, seq: u64, message: &[u8]) -> Result<HmacSha256, ChannelError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.key[..])
            .map_err(|e| ChannelError::Integrity(e.to_string()))?;
        mac.update(&Self::nonce(sender, seq));
        mac.update(message);
        Ok(mac)
    }

    fn protect(&self, seq: u64, message: &[u8]) -> Result<Vec<u8>, ChannelError> {
        match self.mechanism {
            Mechanism::Sealed => ChaCha20Poly1305::new(Key::from_slice(&self.key[..]))
                .encrypt(Nonce::from_slice(&Self::nonce(self.role, seq)), message)
                .map_err(|_| ChannelError::Integrity("encryption failed".to_string())),
            Mechanism::IntegrityOnly => {
                let tag = self.mac(self.role, seq, message)?.finalize().into_bytes();
                let mut out = Vec::with_capacity(message.len() + TAG_LEN);
                out.extend_from_slice(message);
                out.extend_from_slice(&tag);
                Ok(out)
            }
        }
    }

    fn unprotect(&self, seq: u64, frame: &[u8]) -> Result<Vec<u8>, ChannelError> {
        let sender = self.peer();
        match self.mechanism {
            Mechanism::Sealed => ChaCha20Poly1305::new(Key::from_slice(&self.key[..]))
                .decrypt(Nonce::from_slice(&Self::nonce(sender, seq)), frame)
                .map_err(|_| ChannelError::Integrity(format!("message {seq} failed to open"))),
            Mechanism::IntegrityOnly => {
                if frame.len() < TAG_LEN {
                    return Err(ChannelError::Integrity("message too short".to_string()));
                }
                let (message, tag) = frame.split_at(frame.len() - TAG_LEN);
                self.mac(sender, seq, message)?
                    .verify_slice(tag)
                    .map_err(|_| ChannelError::Integrity(format!("message {seq} bad MAC")))?;
                Ok(message.to_vec())
            }
        }
    }
}

fn next(seq: &mut u64) -> Result<u64, ChannelError> {
    let current = *seq;
    *seq = current
        .checked_add(1)
        .ok_or_else(|| ChannelError::Integrity("sequence space exhausted".to_string()))?;
    Ok(current)
}

#[async_trait]
impl<S> SecureChannel for KerberosChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        let seq = next(&mut self.send_seq)?;
        let frame = self.protect(seq, message)?;
        write_frame(&mut self.stream, &frame).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        let Some(frame) = read_frame(&mut self.stream).await? else {
            return Ok(None);
        };
        let seq = next(&mut self.recv_seq)?;
        self.unprotect(seq, &frame).map(Some)
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
