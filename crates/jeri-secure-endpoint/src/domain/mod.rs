//! # Domain Layer
//!
//! Pure negotiation logic with no I/O: the constraint algebra, principals,
//! credential selection, endpoint values and connection bookkeeping.

pub mod connection;
pub mod constraints;
pub mod credentials;
pub mod endpoint;
pub mod errors;
pub mod principal;
pub mod time;

pub use connection::{
    ConnectionId, ConnectionRecord, ConnectionState, PoolKey, RetireReason, SessionProperties,
};
pub use constraints::{combine, reduce, Constraint, ConstraintKind, ConstraintSet, ConstraintSupport};
pub use credentials::{
    select_identity, AuthAction, AuthNeed, CredentialEntry, CredentialMaterial,
    NegotiatedIdentity, Role, SelectionCriteria, ValidityWindow,
};
pub use endpoint::{
    Endpoint, ListenEndpoint, LookupLocator, ProviderTag, SocketFactoryId, DEFAULT_DISCOVERY_PORT,
};
pub use errors::{
    ConfigError, DiscoveryErrorClass, DiscoveryFailure, HandshakeError, LocatorError,
    NegotiationError,
};
pub use principal::{Principal, PrincipalType};
pub use time::Timestamp;
