use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ports::RegistrarDecoder;

/// Decoded registrar proxy.
///
/// Its kind is the ordered list of capability tags it implements; two proxies
/// are the same kind exactly when the lists are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegistrarProxy {
    pub capabilities: Vec<String>,
    /// Opaque state carried by the proxy.
    pub payload: Vec<u8>,
}

impl RegistrarProxy {
    pub fn new(
        capabilities: impl IntoIterator<Item = impl Into<String>>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            payload,
        }
    }

    pub fn same_kind(&self, other: &RegistrarProxy) -> bool {
        self.capabilities == other.capabilities
    }

    pub fn implements(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// Marshalled form understood by [`CapabilityRegistrarDecoder`].
    pub fn encode(&self) -> Result<Vec<u8>, RegistrarDecodeError> {
        bincode::serialize(self).map_err(|e| RegistrarDecodeError::Format(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrarDecodeError {
    /// The proxy names a capability this process does not know.
    #[error("cannot resolve capability: {0}")]
    ClassResolution(String),

    /// The bytes are not a marshalled proxy.
    #[error("malformed registrar: {0}")]
    Format(String),
}

/// Decodes bincode-marshalled [`RegistrarProxy`] records, accepting only
/// proxies whose every capability tag is known.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistrarDecoder {
    known: BTreeSet<String>,
}

impl CapabilityRegistrarDecoder {
    pub fn new(known: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            known: known.into_iter().map(Into::into).collect(),
        }
    }
}

impl RegistrarDecoder for CapabilityRegistrarDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<RegistrarProxy, RegistrarDecodeError> {
        let proxy: RegistrarProxy = bincode::deserialize(bytes)
            .map_err(|e| RegistrarDecodeError::Format(e.to_string()))?;
        if proxy.capabilities.is_empty() {
            return Err(RegistrarDecodeError::Format(
                "proxy implements no capabilities".to_string(),
            ));
        }
        if let Some(unknown) = proxy.capabilities.iter().find(|c| !self.known.contains(*c)) {
            return Err(RegistrarDecodeError::ClassResolution(unknown.clone()));
        }
        Ok(proxy)
    }
}
