//! # Discovery
//!
//! Unicast discovery bootstraps contact with a lookup service: connect to a
//! `jini://host[:port]/` locator, exchange the version-1 handshake, decode the
//! registrar proxy. Resolved addresses are tried one at a time, in resolver
//! order. A [`DiscoveryBridge`] then turns the result into an [`Endpoint`] for
//! one provider.
//!
//! [`Endpoint`]: crate::domain::Endpoint

mod bridge;
mod config;
mod registrar;
mod unicast;
mod wire;

pub use bridge::{
    bridge_for_format, select_peer_principal, DiscoveryBridge, KerberosDiscoveryBridge,
    TlsDiscoveryBridge, KERBEROS_DISCOVERY_FORMAT, TLS_DISCOVERY_FORMAT,
};
pub use config::DiscoveryConfig;
pub use registrar::{CapabilityRegistrarDecoder, RegistrarDecodeError, RegistrarProxy};
pub use unicast::{UnicastDiscovery, UnicastDiscoveryResult};
pub use wire::{
    read_request, read_response, write_request, write_response, UnicastResponse, WireError,
    PROTOCOL_VERSION,
};

use thiserror::Error;

use crate::domain::{LocatorError, NegotiationError};

/// Failure of discovery starting from a locator URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscoveryError {
    /// The URL was rejected before any socket was opened.
    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// Every resolved address failed, or the bridge could not build an endpoint.
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),
}
