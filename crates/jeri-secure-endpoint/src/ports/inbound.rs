//! # Driving Port (Inbound API)
//!
//! What callers use to obtain a secure channel to an endpoint under a set of
//! constraints.

use async_trait::async_trait;

use crate::domain::{ConstraintSet, Endpoint, NegotiationError};
use crate::service::Lease;

/// Snapshot of the connection pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub established: usize,
    pub expiring: usize,
    pub in_flight_negotiations: usize,
}

/// Primary API: connect to an endpoint under constraints.
///
/// Implemented by [`crate::service::ConnectionManager`].
#[async_trait]
pub trait SecureEndpointApi: Send + Sync {
    /// Lease a connection satisfying every requirement of `constraints`.
    ///
    /// Reuses a pooled connection when one already satisfies them, otherwise
    /// negotiates a new one. Concurrent callers asking for the same connection
    /// share one negotiation.
    ///
    /// # Errors
    ///
    /// - `UnsupportedConstraint` when a requirement cannot be met
    /// - `PermissionDenied` when policy forbids the local credential
    /// - `HandshakeFailure` when connect or handshake fails or times out
    async fn connect(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
    ) -> Result<Lease, NegotiationError>;

    /// Current pool counts.
    fn stats(&self) -> PoolStats;

    /// Close every pooled connection and refuse new requests.
    fn shutdown(&self);
}
