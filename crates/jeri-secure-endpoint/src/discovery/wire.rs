//! Version 1 unicast discovery wire format.
//!
//! Request: protocol version, 4-byte big-endian signed integer.
//! Response: registrar record (u32 length + bytes), group count (i32),
//! then that many strings in modified UTF-8 (u16 length + bytes).

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const PROTOCOL_VERSION: i32 = 1;

/// Largest registrar record accepted.
const MAX_REGISTRAR_LEN: usize = 1 << 20;
/// Largest group count accepted.
const MAX_GROUPS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Socket failure or truncated stream.
    #[error("i/o error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// Bytes that do not follow the format.
    #[error("malformed discovery response: {0}")]
    Format(String),

    /// Peer speaks another protocol version.
    #[error("unsupported discovery protocol version {0}")]
    UnsupportedVersion(i32),
}

impl From<io::Error> for WireError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Response body of a unicast handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastResponse {
    /// Marshalled registrar proxy.
    pub registrar: Vec<u8>,
    /// Member groups of the lookup service.
    pub groups: Vec<String>,
}

pub async fn write_request<W>(writer: &mut W) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    writer.write_i32(PROTOCOL_VERSION).await?;
    writer.flush().await?;
    Ok(())
}

/// Server side: read and check the client's version.
pub async fn read_request<R>(reader: &mut R) -> Result<(), WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    match reader.read_i32().await? {
        PROTOCOL_VERSION => Ok(()),
        other => Err(WireError::UnsupportedVersion(other)),
    }
}

pub async fn read_response<R>(reader: &mut R) -> Result<UnicastResponse, WireError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_REGISTRAR_LEN {
        return Err(WireError::Format(format!(
            "registrar record of {len} bytes exceeds {MAX_REGISTRAR_LEN}"
        )));
    }
    let mut registrar = vec![0u8; len];
    reader.read_exact(&mut registrar).await?;

    let count = reader.read_i32().await?;
    let count = usize::try_from(count)
        .map_err(|_| WireError::Format(format!("negative group count {count}")))?;
    if count > MAX_GROUPS {
        return Err(WireError::Format(format!("{count} groups exceeds {MAX_GROUPS}")));
    }

    let mut groups = Vec::with_capacity(count);
    for _ in 0..count {
        let len = reader.read_u16().await? as usize;
        let mut bytes = vec![0u8; len];
        reader.read_exact(&mut bytes).await?;
        groups.push(decode_modified_utf8(bytes)?);
    }
    Ok(UnicastResponse { registrar, groups })
}

pub async fn write_response<W>(
    writer: &mut W,
    response: &UnicastResponse,
) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let len = u32::try_from(response.registrar.len())
        .map_err(|_| WireError::Format("registrar record too large".to_string()))?;
    writer.write_u32(len).await?;
    writer.write_all(&response.registrar).await?;
    let count = i32::try_from(response.groups.len())
        .map_err(|_| WireError::Format("too many groups".to_string()))?;
    writer.write_i32(count).await?;
    for group in &response.groups {
        let bytes = encode_modified_utf8(group);
        let len = u16::try_from(bytes.len())
            .map_err(|_| WireError::Format(format!("group name too long: {group}")))?;
        writer.write_u16(len).await?;
        writer.write_all(&bytes).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Modified UTF-8 writes NUL as `C0 80`. Supplementary characters in
/// surrogate-pair form are not accepted.
fn decode_modified_utf8(mut bytes: Vec<u8>) -> Result<String, WireError> {
    if bytes.windows(2).any(|w| w == [0xC0, 0x80]) {
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == 0xC0 && bytes.get(i + 1) == Some(&0x80) {
                out.push(0);
                i += 2;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        bytes = out;
    }
    String::from_utf8(bytes).map_err(|e| WireError::Format(format!("invalid group name: {e}")))
}

fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for &b in s.as_bytes() {
        if b == 0 {
            out.extend_from_slice(&[0xC0, 0x80]);
        } else {
            out.push(b);
        }
    }
    out
}
