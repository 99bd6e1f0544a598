use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use super::framing::{read_frame, write_frame};
use crate::domain::NegotiationError;

/// Errors on an established channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Socket failure.
    #[error("i/o error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// Message failed authentication or decryption.
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// The peer closed the channel.
    #[error("channel closed by peer")]
    Closed,
}

impl From<io::Error> for ChannelError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<ChannelError> for NegotiationError {
    fn from(err: ChannelError) -> Self {
        NegotiationError::ChannelFailure(err.to_string())
    }
}

/// Message-oriented request channel over an established session.
///
/// Messages sent in order over one channel arrive in order.
#[async_trait]
pub trait SecureChannel: Send {
    async fn send(&mut self, message: &[u8]) -> Result<(), ChannelError>;

    /// Next message, `None` once the peer has closed cleanly.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError>;

    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Length-prefixed messages over a stream the session already protects
/// (a TLS stream, or an in-memory pipe in tests).
pub struct FramedChannel<S> {
    stream: S,
}

impl<S> FramedChannel<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }
}

#[async_trait]
impl<S> SecureChannel for FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        write_frame(&mut self.stream, message).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        Ok(read_frame(&mut self.stream).await?)
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
