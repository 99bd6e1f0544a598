use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::ConnectionManagerConfig;
use super::lease::Lease;
use crate::domain::{
    ConfigError, Constraint, ConnectionId, ConnectionRecord, ConnectionState, ConstraintSet,
    Endpoint, NegotiatedIdentity, NegotiationError, PoolKey, Principal, ProviderTag,
    RetireReason, Role, SessionProperties,
};
use crate::ports::{PoolStats, SecureEndpointApi, TimeSource};
use crate::providers::{with_deadline, SecureChannel, SecurityProvider};
use crate::service::CredentialSelector;

// ============================================================================
// POOLED CONNECTION
// ============================================================================

/// One established session in the pool.
pub(super) struct PooledConnection {
    pub(super) key: PoolKey,
    pub(super) record: Mutex<ConnectionRecord>,
    pub(super) channel: tokio::sync::Mutex<Box<dyn SecureChannel>>,
    pub(super) properties: SessionProperties,
    /// Constraints the session was negotiated for and satisfies.
    pub(super) satisfied: ConstraintSet,
    pub(super) local: NegotiatedIdentity,
    pub(super) peer: Option<Principal>,
    pub(super) peer_addr: SocketAddr,
    pub(super) dgc_supported: bool,
    channel_closed: AtomicBool,
}

impl PooledConnection {
    pub(super) fn id(&self) -> ConnectionId {
        self.record.lock().id
    }

    /// Close the channel once, in the background, after any request still
    /// holding it. Outside a runtime the channel is simply dropped with the
    /// connection.
    pub(super) fn close_channel(self: &Arc<Self>) {
        if self.channel_closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let conn = Arc::clone(self);
        runtime.spawn(async move {
            if let Err(e) = conn.channel.lock().await.close().await {
                debug!(id = %conn.id(), error = %e, "channel close failed");
            }
        });
    }

    /// Whether this session may carry a request under reduced `requested`.
    ///
    /// Every requirement must be among the constraints the session was
    /// negotiated for. Connection time limits only bind establishment.
    fn covers(&self, requested: &ConstraintSet) -> bool {
        requested.requirements().all(|r| {
            matches!(
                r,
                Constraint::ConnectionAbsoluteTime(_) | Constraint::ConnectionRelativeTime(_)
            ) || self.satisfied.requires(r)
                || self.satisfied.prefers(r)
        }) && self.properties.satisfies(requested)
    }
}

type FlightOutcome = Result<Arc<PooledConnection>, NegotiationError>;

#[derive(Clone, PartialEq, Eq, Hash)]
struct FlightKey {
    pool: PoolKey,
    constraints: ConstraintSet,
}

enum FlightRole {
    Leader(watch::Sender<Option<FlightOutcome>>),
    Follower(watch::Receiver<Option<FlightOutcome>>),
}

// ============================================================================
// SHARED STATE
// ============================================================================

pub(super) struct Inner {
    config: ConnectionManagerConfig,
    providers: HashMap<ProviderTag, Arc<dyn SecurityProvider>>,
    time: Arc<dyn TimeSource>,
    credentials: Option<Arc<CredentialSelector>>,
    pool: Mutex<HashMap<PoolKey, Vec<Arc<PooledConnection>>>>,
    flights: Mutex<HashMap<FlightKey, watch::Receiver<Option<FlightOutcome>>>>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
    reaper_stop: Notify,
}

impl Inner {
    pub(super) fn now(&self) -> crate::domain::Timestamp {
        self.time.now()
    }

    pub(super) fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Drop `conn` from the pool.
    pub(super) fn remove(&self, conn: &Arc<PooledConnection>) {
        let mut pool = self.pool.lock();
        if let Some(list) = pool.get_mut(&conn.key) {
            list.retain(|c| !Arc::ptr_eq(c, conn));
            if list.is_empty() {
                pool.remove(&conn.key);
            }
        }
    }
}

/// Removes the in-flight marker when the leading negotiation ends or is
/// cancelled.
struct FlightGuard<'a> {
    inner: &'a Inner,
    key: FlightKey,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.flights.lock().remove(&self.key);
    }
}

// ============================================================================
// CONNECTION MANAGER
// ============================================================================

/// Pool of secure connections across providers.
///
/// Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

/// Builder for [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    config: ConnectionManagerConfig,
    time: Arc<dyn TimeSource>,
    providers: Vec<Arc<dyn SecurityProvider>>,
    credentials: Option<Arc<CredentialSelector>>,
}

impl ConnectionManagerBuilder {
    pub fn config(mut self, config: ConnectionManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn SecurityProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Retire connections whose local credential leaves this selector's store.
    pub fn credential_selector(mut self, selector: Arc<CredentialSelector>) -> Self {
        self.credentials = Some(selector);
        self
    }

    pub fn build(self) -> Result<ConnectionManager, ConfigError> {
        self.config.validate()?;
        let mut providers = HashMap::new();
        for provider in self.providers {
            let tag = provider.tag();
            if providers.insert(tag.clone(), provider).is_some() {
                return Err(ConfigError::Invalid(format!(
                    "provider {tag} registered twice"
                )));
            }
        }
        Ok(ConnectionManager {
            inner: Arc::new(Inner {
                config: self.config,
                providers,
                time: self.time,
                credentials: self.credentials,
                pool: Mutex::new(HashMap::new()),
                flights: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
                reaper_stop: Notify::new(),
            }),
        })
    }
}

impl ConnectionManager {
    pub fn builder(time: Arc<dyn TimeSource>) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder {
            config: ConnectionManagerConfig::default(),
            time,
            providers: Vec::new(),
            credentials: None,
        }
    }

    pub fn config(&self) -> &ConnectionManagerConfig {
        &self.inner.config
    }

    pub fn provider(&self, tag: &ProviderTag) -> Option<Arc<dyn SecurityProvider>> {
        self.inner.providers.get(tag).cloned()
    }

    /// Lease a connection to `endpoint` satisfying `constraints`.
    pub async fn connect(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
    ) -> Result<Lease, NegotiationError> {
        if self.inner.is_shut_down() {
            return Err(NegotiationError::Shutdown);
        }
        let provider = self.provider(endpoint.provider()).ok_or_else(|| {
            NegotiationError::unsupported_reason(format!(
                "no provider registered for {}",
                endpoint.provider()
            ))
        })?;
        let reduced = provider.reduce(constraints)?;
        let identity = provider.client_identity(endpoint, &reduced)?;
        let key = PoolKey::new(endpoint.clone(), identity.principal().cloned());

        loop {
            if let Some(lease) = self.try_reuse(&key, &reduced) {
                debug!(%endpoint, id = %lease.id(), "reusing pooled connection");
                return Ok(lease);
            }

            let flight_key = FlightKey {
                pool: key.clone(),
                constraints: reduced.clone(),
            };
            let role = {
                let mut flights = self.inner.flights.lock();
                match flights.get(&flight_key) {
                    Some(rx) => FlightRole::Follower(rx.clone()),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        flights.insert(flight_key.clone(), rx);
                        FlightRole::Leader(tx)
                    }
                }
            };

            match role {
                FlightRole::Leader(tx) => {
                    let _guard = FlightGuard {
                        inner: &self.inner,
                        key: flight_key,
                    };
                    let outcome = self
                        .negotiate(&*provider, endpoint, &reduced, &identity, key.clone())
                        .await;
                    let _ = tx.send(Some(outcome.clone()));
                    if let Some(lease) = self.lease(outcome?) {
                        return Ok(lease);
                    }
                }
                FlightRole::Follower(mut rx) => {
                    debug!(%endpoint, "awaiting in-flight negotiation");
                    let outcome = match rx.wait_for(Option::is_some).await.map(|v| v.clone()) {
                        Ok(outcome) => outcome,
                        // The leader was cancelled; negotiate afresh.
                        Err(_) => continue,
                    };
                    match outcome {
                        Some(Ok(conn)) => {
                            if let Some(lease) = self.lease(conn) {
                                return Ok(lease);
                            }
                        }
                        Some(Err(e)) => return Err(e),
                        None => {}
                    }
                }
            }
            if self.inner.is_shut_down() {
                return Err(NegotiationError::Shutdown);
            }
        }
    }

    fn try_reuse(&self, key: &PoolKey, reduced: &ConstraintSet) -> Option<Lease> {
        let now = self.inner.now();
        let pool = self.inner.pool.lock();
        pool.get(key)?
            .iter()
            .find(|conn| conn.covers(reduced) && conn.record.lock().begin_request(now))
            .map(|conn| Lease::new(Arc::clone(&self.inner), Arc::clone(conn)))
    }

    fn lease(&self, conn: Arc<PooledConnection>) -> Option<Lease> {
        let now = self.inner.now();
        let started = conn.record.lock().begin_request(now);
        started.then(|| Lease::new(Arc::clone(&self.inner), conn))
    }

    async fn negotiate(
        &self,
        provider: &dyn SecurityProvider,
        endpoint: &Endpoint,
        reduced: &ConstraintSet,
        identity: &NegotiatedIdentity,
        key: PoolKey,
    ) -> FlightOutcome {
        let now = self.inner.now();
        debug!(%endpoint, local = %identity, constraints = ?reduced, "negotiating connection");
        let connection = match with_deadline(
            self.inner.config.connect_timeout,
            provider.connect(endpoint, reduced, identity),
        )
        .await
        {
            Ok(connection) => connection,
            Err(e) => {
                warn!(%endpoint, error = %e, "negotiation failed");
                return Err(e);
            }
        };

        let id = ConnectionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut record = ConnectionRecord::connecting(
            id,
            now,
            provider.max_session_duration(Role::Client),
            identity.expires_at(),
        );
        record.session_expires_at = record.session_expires_at.min(connection.session_expires_at);
        record.mark_established();

        let pooled = Arc::new(PooledConnection {
            key: key.clone(),
            record: Mutex::new(record),
            channel: tokio::sync::Mutex::new(connection.channel),
            properties: connection.properties,
            satisfied: connection.satisfied,
            local: connection.local,
            peer: connection.peer,
            peer_addr: connection.peer_addr,
            dgc_supported: provider.dgc_supported(),
            channel_closed: AtomicBool::new(false),
        });

        {
            let mut pool = self.inner.pool.lock();
            if self.inner.is_shut_down() {
                pooled.record.lock().close(RetireReason::Shutdown);
                pooled.close_channel();
                return Err(NegotiationError::Shutdown);
            }
            pool.entry(key).or_default().push(Arc::clone(&pooled));
        }
        info!(
            %endpoint,
            %id,
            peer = ?pooled.peer,
            peer_addr = %pooled.peer_addr,
            "connection established"
        );
        Ok(pooled)
    }

    /// Apply retirement, idle and removal rules once. Returns how many
    /// connections were removed.
    ///
    /// Credential revalidation may block on the store, so it runs without the
    /// pool lock held.
    pub fn reap_now(&self) -> usize {
        self.revalidate_credentials();

        let now = self.inner.now();
        let idle = self.inner.config.idle_timeout;
        let mut closed = Vec::new();
        {
            let mut pool = self.inner.pool.lock();
            for list in pool.values_mut() {
                list.retain(|conn| {
                    let mut record = conn.record.lock();
                    if let Some(state) = record.evaluate(now, idle) {
                        info!(id = %record.id, ?state, reason = ?record.retired_for, "connection state changed");
                    }
                    if record.is_closed() {
                        closed.push(Arc::clone(conn));
                        false
                    } else {
                        true
                    }
                });
            }
            pool.retain(|_, list| !list.is_empty());
        }
        for conn in &closed {
            conn.close_channel();
        }
        if !closed.is_empty() {
            debug!(removed = closed.len(), "reaped closed connections");
        }
        closed.len()
    }

    /// Retire established connections whose local credential left the store.
    fn revalidate_credentials(&self) {
        let Some(selector) = &self.inner.credentials else {
            return;
        };
        let established: Vec<Arc<PooledConnection>> = {
            let pool = self.inner.pool.lock();
            pool.values()
                .flatten()
                .filter(|conn| conn.record.lock().state == ConnectionState::Established)
                .cloned()
                .collect()
        };
        for conn in established {
            if selector.is_still_valid(&conn.local) {
                continue;
            }
            let mut record = conn.record.lock();
            if record.state == ConnectionState::Established {
                record.retire(RetireReason::CredentialExpired);
                info!(id = %record.id, "local credential no longer valid");
            }
        }
    }

    /// Run [`Self::reap_now`] every `reap_interval` until shutdown.
    pub fn spawn_reaper(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.inner.config.reap_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        manager.reap_now();
                    }
                    _ = manager.inner.reaper_stop.notified() => break,
                }
                if manager.inner.is_shut_down() {
                    break;
                }
            }
            debug!("reaper stopped");
        })
    }

    pub fn stats(&self) -> PoolStats {
        let pool = self.inner.pool.lock();
        let mut stats = PoolStats {
            in_flight_negotiations: self.inner.flights.lock().len(),
            ..PoolStats::default()
        };
        for conn in pool.values().flatten() {
            match conn.record.lock().state {
                ConnectionState::Established => stats.established += 1,
                ConnectionState::Expiring => stats.expiring += 1,
                ConnectionState::Connecting | ConnectionState::Closed => {}
            }
        }
        stats
    }

    /// Close every pooled connection and refuse new requests.
    ///
    /// Sockets close as soon as outstanding leases are dropped.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.reaper_stop.notify_waiters();
        let drained: Vec<Arc<PooledConnection>> = {
            let mut pool = self.inner.pool.lock();
            pool.drain().flat_map(|(_, list)| list).collect()
        };
        for conn in &drained {
            conn.record.lock().close(RetireReason::Shutdown);
            conn.close_channel();
        }
        info!(closed = drained.len(), "connection manager shut down");
    }
}

#[async_trait]
impl SecureEndpointApi for ConnectionManager {
    async fn connect(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
    ) -> Result<Lease, NegotiationError> {
        ConnectionManager::connect(self, endpoint, constraints).await
    }

    fn stats(&self) -> PoolStats {
        ConnectionManager::stats(self)
    }

    fn shutdown(&self) {
        ConnectionManager::shutdown(self)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("providers", &self.inner.providers.keys().collect::<Vec<_>>())
            .field("stats", &self.stats())
            .finish()
    }
}
