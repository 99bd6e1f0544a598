//! # Driven Ports (Outbound SPI)
//!
//! Interfaces this subsystem requires the host application to implement.
//! Adapters for the common cases live in [`crate::adapters`].

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use zeroize::Zeroizing;

use crate::discovery::{RegistrarDecodeError, RegistrarProxy};
use crate::domain::{
    AuthAction, CredentialEntry, HandshakeError, Principal, PrincipalType, SocketFactoryId,
    Timestamp,
};
use crate::providers::SecureChannel;
use crate::service::InboundContext;

/// Abstract interface for time.
///
/// Allows deterministic testing of validity windows and session bounds.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Read-only principal and credential store.
///
/// Passed in explicitly; there is no ambient identity. May be slow; callers
/// bound lookups with the negotiation deadline.
pub trait CredentialStore: Send + Sync {
    /// Every entry of `kind`, in store order. Expired entries may be included.
    fn entries(&self, kind: PrincipalType) -> Vec<CredentialEntry>;
}

/// Whether `local` may be used toward `peer` for `action`.
///
/// Any `Fn(&Principal, Option<&Principal>, AuthAction) -> bool` is a permission check.
pub trait PermissionCheck: Send + Sync {
    fn permits(&self, local: &Principal, peer: Option<&Principal>, action: AuthAction) -> bool;
}

impl<F> PermissionCheck for F
where
    F: Fn(&Principal, Option<&Principal>, AuthAction) -> bool + Send + Sync,
{
    fn permits(&self, local: &Principal, peer: Option<&Principal>, action: AuthAction) -> bool {
        self(local, peer, action)
    }
}

/// Host name resolution. Addresses are tried in the returned order.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;
}

/// Opens raw TCP connections, optionally through a named socket factory.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(
        &self,
        addr: SocketAddr,
        factory: Option<&SocketFactoryId>,
    ) -> io::Result<TcpStream>;
}

/// Local policy on which discovery addresses may be contacted.
pub trait ConnectPolicy: Send + Sync {
    fn may_connect(&self, addr: &SocketAddr) -> bool;
}

impl<F> ConnectPolicy for F
where
    F: Fn(&SocketAddr) -> bool + Send + Sync,
{
    fn may_connect(&self, addr: &SocketAddr) -> bool {
        self(addr)
    }
}

/// Turns the marshalled registrar bytes of a unicast response into a proxy.
pub trait RegistrarDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<RegistrarProxy, RegistrarDecodeError>;
}

/// Receives validated inbound connections from the accept loop.
///
/// The request framing on top of the channel belongs to the dispatcher.
#[async_trait]
pub trait RequestDispatcher: Send + Sync {
    async fn dispatch(&self, context: InboundContext, channel: Box<dyn SecureChannel>);
}

/// Ticket issued by a key distribution center.
pub struct TicketGrant {
    /// Opaque ticket, sealed under the server's long-term key.
    pub ticket: Vec<u8>,
    /// Session key shared with the server through the ticket.
    pub session_key: Zeroizing<[u8; 32]>,
    pub expires_at: Timestamp,
}

/// Issues service tickets for the Kerberos-style provider.
pub trait KeyDistributionCenter: Send + Sync {
    /// Ticket for `client` (proving knowledge of `client_key`) to reach `server`.
    fn issue_ticket(
        &self,
        client: &Principal,
        client_key: &[u8; 32],
        server: &Principal,
        now: Timestamp,
        lifetime: Duration,
    ) -> Result<TicketGrant, HandshakeError>;
}
