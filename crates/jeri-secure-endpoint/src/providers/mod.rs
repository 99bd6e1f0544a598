//! # Security Providers
//!
//! A provider realizes the constraint algebra for one security mechanism:
//! its support matrix, local identity selection, the client and server
//! handshakes, and the properties of the resulting session.
//!
//! - [`tls`]: certificate-based TLS-style provider (rustls).
//! - [`kerberos`]: ticket-based Kerberos-style provider.
//!
//! Adding a provider means implementing [`SecurityProvider`] (and a
//! [`crate::discovery::DiscoveryBridge`] if it takes part in discovery) under a
//! new [`ProviderTag`].

mod channel;
mod framing;
pub mod kerberos;
pub mod tls;

pub use channel::{ChannelError, FramedChannel, SecureChannel};
pub use framing::{read_frame, write_frame, MAX_FRAME_LEN};

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use crate::domain::{
    reduce, Constraint, ConstraintKind, ConstraintSet, ConstraintSupport, Endpoint,
    HandshakeError, ListenEndpoint, NegotiatedIdentity, NegotiationError, Principal,
    PrincipalType, ProviderTag, Role, SessionProperties, Timestamp,
};
use crate::ports::{HostResolver, SocketConnector};

/// A connection established by a provider handshake.
///
/// Handed to the connection manager (client side) or the request dispatcher
/// (server side). Nothing else holds it.
pub struct Connection {
    pub channel: Box<dyn SecureChannel>,
    pub properties: SessionProperties,
    /// Constraints the session was negotiated for and satisfies.
    pub satisfied: ConstraintSet,
    pub local: NegotiatedIdentity,
    /// Authenticated peer, `None` for an anonymous peer.
    pub peer: Option<Principal>,
    pub peer_addr: SocketAddr,
    pub established_at: Timestamp,
    /// Sessions are retired at this instant at the latest.
    pub session_expires_at: Timestamp,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("local", &self.local.principal())
            .field("peer", &self.peer)
            .field("peer_addr", &self.peer_addr)
            .field("session_expires_at", &self.session_expires_at)
            .finish_non_exhaustive()
    }
}

/// One security mechanism.
#[async_trait]
pub trait SecurityProvider: Send + Sync {
    fn tag(&self) -> ProviderTag;

    /// Principal type this provider authenticates with.
    fn principal_type(&self) -> PrincipalType;

    /// Constraint kinds this provider understands at all.
    fn supported_kinds(&self) -> BTreeSet<ConstraintKind>;

    /// Whether this provider can realize `constraint` given the rest of `context`.
    fn supports(&self, constraint: &Constraint, context: &ConstraintSet) -> bool;

    /// Upper bound on a session's lifetime for the given side.
    fn max_session_duration(&self, role: Role) -> Duration;

    /// Default bound on connect plus handshake.
    fn handshake_timeout(&self) -> Duration;

    /// Whether auxiliary distributed garbage collection calls can be carried.
    fn dgc_supported(&self) -> bool {
        true
    }

    /// Project `constraints` onto this provider.
    fn reduce(&self, constraints: &ConstraintSet) -> Result<ConstraintSet, NegotiationError> {
        reduce(constraints, &ProviderSupport { provider: self })
    }

    /// Local identity for connecting to `endpoint` under reduced `constraints`.
    fn client_identity(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
    ) -> Result<NegotiatedIdentity, NegotiationError>;

    /// Open a socket to `endpoint` and run the client handshake.
    ///
    /// Fails with `UnsupportedConstraint` when the established session does not
    /// meet a requirement; the socket is closed in that case.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
        identity: &NegotiatedIdentity,
    ) -> Result<Connection, NegotiationError>;

    /// Local identity for listening on `endpoint`. Re-run before every new
    /// inbound session so expired credentials are noticed.
    fn server_identity(
        &self,
        endpoint: &ListenEndpoint,
    ) -> Result<NegotiatedIdentity, NegotiationError>;

    /// Run the server handshake on an accepted socket.
    async fn accept(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        identity: &NegotiatedIdentity,
    ) -> Result<Connection, NegotiationError>;
}

/// Adapts a provider's support matrix to [`ConstraintSupport`].
struct ProviderSupport<'a, P: ?Sized> {
    provider: &'a P,
}

impl<P: SecurityProvider + ?Sized> ConstraintSupport for ProviderSupport<'_, P> {
    fn supports(&self, constraint: &Constraint, context: &ConstraintSet) -> bool {
        self.provider.supported_kinds().contains(&constraint.kind())
            && self.provider.supports(constraint, context)
    }

    fn describe(&self) -> String {
        format!("{} provider", self.provider.tag())
    }
}

/// The server principal a client must see: the endpoint's, else the single
/// principal of a `ServerMinPrincipal` requirement.
pub(crate) fn expected_server_principal(
    endpoint: &Endpoint,
    constraints: &ConstraintSet,
) -> Option<Principal> {
    endpoint.server_principal().cloned().or_else(|| {
        constraints
            .requirements_of(ConstraintKind::ServerMinPrincipal)
            .find_map(|c| match c {
                Constraint::ServerMinPrincipal(set) if set.len() == 1 => set.first().cloned(),
                _ => None,
            })
    })
}

/// Resolve `endpoint` and connect to the first address that accepts.
pub(crate) async fn open_socket(
    resolver: &dyn HostResolver,
    connector: &dyn SocketConnector,
    endpoint: &Endpoint,
) -> Result<TcpStream, HandshakeError> {
    let addrs = resolver.resolve(endpoint.host(), endpoint.port()).await?;
    let mut last_error: Option<HandshakeError> = None;
    for addr in addrs {
        match connector.connect(addr, endpoint.socket_factory()).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(%addr, error = %e, "failed to set TCP_NODELAY");
                }
                return Ok(stream);
            }
            Err(e) => {
                debug!(%addr, error = %e, "connect attempt failed");
                last_error = Some(e.into());
            }
        }
    }
    Err(last_error.unwrap_or_else(|| HandshakeError::Io {
        kind: std::io::ErrorKind::NotFound,
        message: format!("no addresses for {}", endpoint.host()),
    }))
}

/// Bound a handshake future by `budget`, mapping elapsed time to `TimedOut`.
pub(crate) async fn with_deadline<T>(
    budget: Duration,
    fut: impl std::future::Future<Output = Result<T, NegotiationError>>,
) -> Result<T, NegotiationError> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result,
        Err(_) => Err(HandshakeError::TimedOut(budget).into()),
    }
}

/// Keep the requirements and the preferences the session actually provides.
pub(crate) fn satisfied_subset(
    properties: &SessionProperties,
    constraints: &ConstraintSet,
) -> Result<ConstraintSet, NegotiationError> {
    if !properties.satisfies(constraints) {
        let failed = constraints
            .requirements()
            .find(|r| !r.elements().iter().any(|e| properties.supports(e, constraints)));
        return Err(match failed {
            Some(requirement) => {
                NegotiationError::unsupported(requirement, "not met by the established session")
            }
            None => NegotiationError::unsupported_reason("session does not meet requirements"),
        });
    }
    ConstraintSet::new(
        constraints.requirements().cloned(),
        constraints
            .preferences()
            .filter(|p| p.elements().iter().any(|e| properties.supports(e, constraints)))
            .cloned(),
    )
}
