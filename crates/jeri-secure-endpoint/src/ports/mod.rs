//! # Ports
//!
//! - [`inbound`]: the API this subsystem offers (driving port).
//! - [`outbound`]: what the host application supplies (driven ports): clock,
//!   credential store, permission check, name resolution, sockets, registrar
//!   decoding, request dispatch and the key distribution center.

pub mod inbound;
pub mod outbound;

pub use inbound::{PoolStats, SecureEndpointApi};
pub use outbound::{
    ConnectPolicy, CredentialStore, HostResolver, KeyDistributionCenter, PermissionCheck,
    RegistrarDecoder, RequestDispatcher, SocketConnector, TicketGrant, TimeSource,
};
