use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, warn};

use super::manager::{Inner, PooledConnection};
use crate::domain::{
    ConnectionId, ConstraintSet, Endpoint, NegotiationError, Principal, RetireReason,
    SessionProperties,
};
use crate::providers::ChannelError;

/// Shared use of a pooled connection for one or more requests.
///
/// Several leases may hold the same connection at once. [`Lease::call`] keeps
/// the channel for the whole request and reply; separate [`Lease::send`] and
/// [`Lease::recv`] calls do not, so a reply may be taken by another lease.
///
/// Dropping the lease returns the connection to the pool. A connection that
/// fails I/O while leased is closed and never handed out again.
pub struct Lease {
    inner: Arc<Inner>,
    conn: Arc<PooledConnection>,
}

impl Lease {
    pub(super) fn new(inner: Arc<Inner>, conn: Arc<PooledConnection>) -> Self {
        Self { inner, conn }
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id()
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.conn.key.endpoint()
    }

    pub fn properties(&self) -> &SessionProperties {
        &self.conn.properties
    }

    /// Constraints the session was negotiated for and satisfies.
    pub fn satisfied(&self) -> &ConstraintSet {
        &self.conn.satisfied
    }

    pub fn peer(&self) -> Option<&Principal> {
        self.conn.peer.as_ref()
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.conn.peer_addr
    }

    /// Principal this side authenticated as, `None` when anonymous.
    pub fn local_principal(&self) -> Option<&Principal> {
        self.conn.local.principal()
    }

    pub async fn send(&self, message: &[u8]) -> Result<(), NegotiationError> {
        let result = self.conn.channel.lock().await.send(message).await;
        self.check(result)
    }

    /// Next message from the peer. A clean close mid-request is a failure.
    pub async fn recv(&self) -> Result<Vec<u8>, NegotiationError> {
        let result = self.conn.channel.lock().await.recv().await;
        match self.check(result)? {
            Some(message) => Ok(message),
            None => Err(self.fail(ChannelError::Closed)),
        }
    }

    /// Send `request` and wait for its reply without interleaving with
    /// other users of the same connection.
    pub async fn call(&self, request: &[u8]) -> Result<Vec<u8>, NegotiationError> {
        let mut channel = self.conn.channel.lock().await;
        let sent = channel.send(request).await;
        self.check(sent)?;
        let received = channel.recv().await;
        drop(channel);
        match self.check(received)? {
            Some(reply) => Ok(reply),
            None => Err(self.fail(ChannelError::Closed)),
        }
    }

    /// Send an auxiliary distributed-GC message. Dropped when the provider
    /// cannot carry it.
    pub async fn send_dgc(&self, message: &[u8]) -> Result<bool, NegotiationError> {
        if !self.conn.dgc_supported {
            debug!(id = %self.id(), "provider does not carry DGC calls, dropping");
            return Ok(false);
        }
        self.send(message).await?;
        Ok(true)
    }

    fn check<T>(&self, result: Result<T, ChannelError>) -> Result<T, NegotiationError> {
        result.map_err(|e| self.fail(e))
    }

    /// Tear the connection down after a channel failure.
    fn fail(&self, err: ChannelError) -> NegotiationError {
        warn!(id = %self.id(), endpoint = %self.endpoint(), error = %err, "connection failed");
        self.conn.record.lock().close(RetireReason::IoFailure);
        self.inner.remove(&self.conn);
        self.conn.close_channel();
        err.into()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let now = self.inner.now();
        let closed = {
            let mut record = self.conn.record.lock();
            record.end_request(now);
            record.is_closed()
        };
        if closed {
            self.inner.remove(&self.conn);
            self.conn.close_channel();
            debug!(id = %self.id(), "connection closed after last request");
        }
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id())
            .field("endpoint", self.endpoint())
            .field("peer", &self.conn.peer)
            .finish()
    }
}
