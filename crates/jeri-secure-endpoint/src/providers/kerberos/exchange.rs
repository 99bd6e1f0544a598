//! AP-REQ / AP-REP messages on the wire.

use std::io;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::domain::HandshakeError;
use crate::providers::{read_frame, write_frame};

/// Handshake frames are much smaller than request frames.
pub(crate) const MAX_HANDSHAKE_FRAME: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum KrbMessage {
    ApReq {
        ticket: Vec<u8>,
        authenticator: Vec<u8>,
    },
    ApRep {
        reply: Vec<u8>,
    },
    Error {
        reason: String,
    },
}

pub(crate) async fn send_message<S>(
    stream: &mut S,
    message: &KrbMessage,
) -> Result<(), HandshakeError>
where
    S: AsyncWrite + Unpin + ?Sized,
{
    let bytes =
        bincode::serialize(message).map_err(|e| HandshakeError::Protocol(e.to_string()))?;
    if bytes.len() > MAX_HANDSHAKE_FRAME {
        return Err(HandshakeError::Protocol(format!(
            "handshake message of {} bytes exceeds {MAX_HANDSHAKE_FRAME}",
            bytes.len()
        )));
    }
    write_frame(stream, &bytes).await?;
    Ok(())
}

pub(crate) async fn recv_message<S>(stream: &mut S) -> Result<KrbMessage, HandshakeError>
where
    S: AsyncRead + Unpin + ?Sized,
{
    let bytes = read_frame(stream).await?.ok_or_else(|| {
        HandshakeError::from(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "peer closed during handshake",
        ))
    })?;
    if bytes.len() > MAX_HANDSHAKE_FRAME {
        return Err(HandshakeError::Protocol(format!(
            "handshake message of {} bytes exceeds {MAX_HANDSHAKE_FRAME}",
            bytes.len()
        )));
    }
    bincode::deserialize(&bytes).map_err(|e| HandshakeError::Protocol(e.to_string()))
}
