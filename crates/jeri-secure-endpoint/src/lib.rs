//! # JERI Secure Endpoint Negotiation
//!
//! Client and server endpoints for a remote-invocation transport that
//! negotiate a secure connection satisfying a set of security constraints.
//!
//! A caller states *requirements* (must hold) and *preferences* (nice to have)
//! such as client authentication, confidentiality, integrity, delegation,
//! principal restrictions and connection deadlines. A security provider
//! chooses local credentials, runs its handshake and reports exactly which
//! constraints the resulting session satisfies. Established sessions are
//! pooled and reused when they cover a later request.
//!
//! ## Architecture
//!
//! - **Domain:** constraint algebra, principals, credential selection,
//!   endpoint values and the connection state machine. No I/O.
//! - **Ports:** [`SecureEndpointApi`] for callers; clock, credential store,
//!   permission check, sockets, registrar decoding, request dispatch and the
//!   key distribution center for the host to supply.
//! - **Providers:** TLS-style (rustls) and Kerberos-style.
//! - **Service:** [`ConnectionManager`] and [`Listener`].
//! - **Discovery:** unicast lookup handshake and per-provider bridges.
//! - **Adapters:** system clock, tokio networking, in-memory stores,
//!   TOML and environment configuration, tracing setup.
//!
//! ## Example
//!
//! ```rust
//! use jeri_secure_endpoint::{combine, Constraint, ConstraintSet, LookupLocator};
//!
//! let caller = ConstraintSet::new(
//!     [Constraint::Integrity(true)],
//!     [Constraint::Confidentiality(true)],
//! )
//! .unwrap();
//! let method = ConstraintSet::requiring([Constraint::ClientAuthentication(true)]).unwrap();
//!
//! let combined = combine(&caller, &method).unwrap();
//! assert_eq!(combined.requirements().count(), 2);
//! assert_eq!(combined, combine(&method, &caller).unwrap());
//!
//! // Opposite requirements never combine.
//! let anonymous = ConstraintSet::requiring([Constraint::ClientAuthentication(false)]).unwrap();
//! assert!(combine(&method, &anonymous).is_err());
//!
//! let locator: LookupLocator = "jini://lookup.example.com/".parse().unwrap();
//! assert_eq!(locator.port(), 4160);
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod adapters;
pub mod discovery;
pub mod domain;
pub mod ports;
pub mod providers;
pub mod service;

/// Test utilities (ControlledTimeSource, CountingProvider)
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// RE-EXPORTS
// =============================================================================

// Domain
pub use domain::{
    combine, reduce, AuthAction, AuthNeed, ConfigError, ConnectionId, ConnectionState, Constraint,
    ConstraintKind, ConstraintSet, ConstraintSupport, CredentialEntry, CredentialMaterial,
    DiscoveryErrorClass, DiscoveryFailure, Endpoint, HandshakeError, ListenEndpoint,
    LocatorError, LookupLocator, NegotiatedIdentity, NegotiationError, PoolKey, Principal,
    PrincipalType, ProviderTag, Role, SelectionCriteria, SessionProperties, SocketFactoryId,
    Timestamp, ValidityWindow, DEFAULT_DISCOVERY_PORT,
};

// Ports
pub use ports::{
    ConnectPolicy, CredentialStore, HostResolver, KeyDistributionCenter, PermissionCheck,
    PoolStats, RegistrarDecoder, RequestDispatcher, SecureEndpointApi, SocketConnector,
    TicketGrant, TimeSource,
};

// Providers
pub use providers::kerberos::{KerberosProvider, KerberosProviderConfig, Mechanism};
pub use providers::tls::{TlsProvider, TlsProviderConfig};
pub use providers::{ChannelError, Connection, SecureChannel, SecurityProvider};

// Services
pub use service::{
    ConnectionManager, ConnectionManagerBuilder, ConnectionManagerConfig, CredentialSelector,
    InboundContext, Lease, Listener, ListenerHandle,
};

// Discovery
pub use discovery::{
    bridge_for_format, DiscoveryBridge, DiscoveryConfig, DiscoveryError, RegistrarProxy,
    UnicastDiscovery, UnicastDiscoveryResult,
};

// Adapters
pub use adapters::{
    init_tracing, ConfigFile, InMemoryCredentialStore, LoggingConfig, SystemTimeSource,
};

#[cfg(feature = "test-utils")]
pub use test_utils::{ControlledTimeSource, CountingProvider};
