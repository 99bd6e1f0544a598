use super::*;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use zeroize::Zeroizing;

use crate::adapters::{AllowAll, InMemoryCredentialStore};
use crate::domain::{
    Constraint, ConstraintSet, CredentialEntry, CredentialMaterial, Endpoint, HandshakeError,
    NegotiationError, Principal, ProviderTag, ValidityWindow,
};
use crate::ports::{PoolStats, SecureEndpointApi};
use crate::service::CredentialSelector;
use crate::test_utils::{ControlledTimeSource, CountingProvider};

// =============================================================================
// FIXTURES
// =============================================================================

fn tag() -> ProviderTag {
    ProviderTag::new("counting")
}

fn endpoint() -> Endpoint {
    Endpoint::new("server.example", 4160, tag())
}

fn manager_with(provider: Arc<CountingProvider>, time: &ControlledTimeSource) -> ConnectionManager {
    ConnectionManager::builder(Arc::new(time.clone()))
        .config(ConnectionManagerConfig::for_testing())
        .provider(provider)
        .build()
        .unwrap()
}

fn setup() -> (ConnectionManager, Arc<CountingProvider>, ControlledTimeSource) {
    let time = ControlledTimeSource::new(1_000_000);
    let provider = Arc::new(CountingProvider::new(tag(), Arc::new(time.clone())));
    (manager_with(Arc::clone(&provider), &time), provider, time)
}

fn integrity() -> ConstraintSet {
    ConstraintSet::requiring([Constraint::Integrity(true)]).unwrap()
}

fn integrity_and_confidentiality() -> ConstraintSet {
    ConstraintSet::requiring([Constraint::Integrity(true), Constraint::Confidentiality(true)])
        .unwrap()
}

// =============================================================================
// REUSE
// =============================================================================

#[tokio::test]
async fn test_reuses_connection_for_covered_constraints() {
    let (manager, provider, _time) = setup();

    let first = manager
        .connect(&endpoint(), &integrity_and_confidentiality())
        .await
        .unwrap();
    let first_id = first.id();
    drop(first);

    let second = manager.connect(&endpoint(), &integrity()).await.unwrap();
    assert_eq!(second.id(), first_id);
    assert_eq!(provider.connects(), 1);
}

#[tokio::test]
async fn test_new_connection_when_requirement_not_negotiated() {
    let (manager, provider, _time) = setup();

    let first = manager.connect(&endpoint(), &integrity()).await.unwrap();
    let first_id = first.id();
    drop(first);

    let second = manager
        .connect(&endpoint(), &integrity_and_confidentiality())
        .await
        .unwrap();
    assert_ne!(second.id(), first_id);
    assert_eq!(provider.connects(), 2);
    assert_eq!(manager.stats().established, 2);
}

#[tokio::test]
async fn test_unsupported_preference_does_not_force_new_connection() {
    let (manager, provider, _time) = setup();

    drop(manager.connect(&endpoint(), &integrity()).await.unwrap());

    let with_preference =
        ConstraintSet::new([Constraint::Integrity(true)], [Constraint::Confidentiality(false)])
            .unwrap();
    let lease = manager.connect(&endpoint(), &with_preference).await.unwrap();
    assert!(lease.properties().confidentiality);
    assert_eq!(provider.connects(), 1);
}

#[tokio::test]
async fn test_different_endpoints_do_not_share() {
    let (manager, provider, _time) = setup();
    let other = Endpoint::new("other.example", 4160, tag());

    let a = manager.connect(&endpoint(), &integrity()).await.unwrap();
    let b = manager.connect(&other, &integrity()).await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(b.endpoint(), &other);
    assert_eq!(provider.connects(), 2);
}

#[tokio::test]
async fn test_unsatisfiable_requirement_fails_before_connecting() {
    let (manager, provider, _time) = setup();
    let constraints = ConstraintSet::requiring([Constraint::Confidentiality(false)]).unwrap();

    let err = manager.connect(&endpoint(), &constraints).await.unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(provider.connects(), 0);
}

#[tokio::test]
async fn test_unknown_provider_is_unsupported() {
    let (manager, _provider, _time) = setup();
    let endpoint = Endpoint::new("server.example", 4160, ProviderTag::KERBEROS);

    let err = manager.connect(&endpoint, &integrity()).await.unwrap_err();
    assert!(err.is_unsupported());
}

// =============================================================================
// SINGLE-FLIGHT NEGOTIATION
// =============================================================================

#[tokio::test]
async fn test_concurrent_connects_share_one_handshake() {
    let time = ControlledTimeSource::new(0);
    let provider = Arc::new(
        CountingProvider::new(tag(), Arc::new(time.clone()))
            .with_handshake_delay(Duration::from_millis(100)),
    );
    let manager = manager_with(Arc::clone(&provider), &time);
    let endpoint = endpoint();
    let constraints = integrity();

    let leases = join_all((0..5).map(|_| manager.connect(&endpoint, &constraints))).await;

    assert_eq!(provider.connects(), 1);
    let ids: Vec<_> = leases.iter().map(|l| l.as_ref().unwrap().id()).collect();
    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(manager.stats().in_flight_negotiations, 0);
}

#[tokio::test]
async fn test_shared_failure_reaches_every_waiter() {
    let time = ControlledTimeSource::new(0);
    let provider = Arc::new(
        CountingProvider::new(tag(), Arc::new(time.clone()))
            .with_handshake_delay(Duration::from_millis(100)),
    );
    provider.fail_next_connect();
    let manager = manager_with(Arc::clone(&provider), &time);
    let endpoint = endpoint();
    let constraints = integrity();

    let results = join_all((0..3).map(|_| manager.connect(&endpoint, &constraints))).await;

    assert_eq!(provider.connects(), 1);
    for result in results {
        assert_eq!(
            result.unwrap_err(),
            NegotiationError::HandshakeFailure(HandshakeError::Protocol(
                "injected failure".to_string()
            ))
        );
    }

    // Failures are not cached.
    assert!(manager.connect(&endpoint, &constraints).await.is_ok());
    assert_eq!(provider.connects(), 2);
}

#[tokio::test]
async fn test_connect_timeout_bounds_negotiation() {
    let time = ControlledTimeSource::new(0);
    let provider = Arc::new(
        CountingProvider::new(tag(), Arc::new(time.clone()))
            .with_handshake_delay(Duration::from_secs(2)),
    );
    let manager = ConnectionManager::builder(Arc::new(time))
        .config(ConnectionManagerConfig {
            connect_timeout: Duration::from_millis(100),
            ..ConnectionManagerConfig::for_testing()
        })
        .provider(provider)
        .build()
        .unwrap();

    let err = manager.connect(&endpoint(), &integrity()).await.unwrap_err();
    assert!(matches!(
        err,
        NegotiationError::HandshakeFailure(HandshakeError::TimedOut(_))
    ));
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[tokio::test]
async fn test_session_bound_retires_connection() {
    let time = ControlledTimeSource::new(0);
    let provider = Arc::new(
        CountingProvider::new(tag(), Arc::new(time.clone()))
            .with_session_duration(Duration::from_secs(10)),
    );
    let manager = manager_with(Arc::clone(&provider), &time);

    let first = manager.connect(&endpoint(), &integrity()).await.unwrap();
    let first_id = first.id();
    drop(first);

    time.advance(Duration::from_secs(11));
    let second = manager.connect(&endpoint(), &integrity()).await.unwrap();
    assert_ne!(second.id(), first_id);
    assert_eq!(provider.connects(), 2);
}

#[tokio::test]
async fn test_expiring_connection_serves_in_flight_request() {
    let time = ControlledTimeSource::new(0);
    let provider = Arc::new(
        CountingProvider::new(tag(), Arc::new(time.clone()))
            .with_session_duration(Duration::from_secs(10)),
    );
    let manager = manager_with(Arc::clone(&provider), &time);

    let lease = manager.connect(&endpoint(), &integrity()).await.unwrap();
    time.advance(Duration::from_secs(11));
    manager.reap_now();
    assert_eq!(
        manager.stats(),
        PoolStats {
            established: 0,
            expiring: 1,
            in_flight_negotiations: 0,
        }
    );

    assert_eq!(lease.call(b"still here").await.unwrap(), b"still here");
    drop(lease);
    assert_eq!(manager.stats(), PoolStats::default());
}

#[tokio::test]
async fn test_reap_closes_idle_connections() {
    let (manager, _provider, time) = setup();

    drop(manager.connect(&endpoint(), &integrity()).await.unwrap());
    assert_eq!(manager.reap_now(), 0);

    time.advance(Duration::from_secs(16));
    assert_eq!(manager.reap_now(), 1);
    assert_eq!(manager.stats().established, 0);
}

#[tokio::test]
async fn test_leased_connection_is_never_idle() {
    let (manager, _provider, time) = setup();

    let lease = manager.connect(&endpoint(), &integrity()).await.unwrap();
    time.advance(Duration::from_secs(60));
    assert_eq!(manager.reap_now(), 0);
    assert_eq!(manager.stats().established, 1);
    drop(lease);
}

#[tokio::test]
async fn test_background_reaper_runs() {
    let (manager, _provider, time) = setup();
    let reaper = manager.spawn_reaper();

    drop(manager.connect(&endpoint(), &integrity()).await.unwrap());
    time.advance(Duration::from_secs(16));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(manager.stats().established, 0);

    manager.shutdown();
    tokio::time::timeout(Duration::from_secs(1), reaper)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_revoked_credential_retires_connection() {
    let time = ControlledTimeSource::new(0);
    let alice = Principal::x500("CN=alice");
    let store = Arc::new(InMemoryCredentialStore::with_entries([CredentialEntry::new(
        alice.clone(),
        CredentialMaterial::Kerberos {
            key: Zeroizing::new([0u8; 32]),
        },
        ValidityWindow::unbounded(),
    )]));
    let selector = Arc::new(CredentialSelector::new(
        store.clone(),
        Arc::new(AllowAll),
        Arc::new(time.clone()),
    ));
    let provider = Arc::new(
        CountingProvider::new(tag(), Arc::new(time.clone())).with_client(alice.clone()),
    );
    let manager = ConnectionManager::builder(Arc::new(time))
        .config(ConnectionManagerConfig::for_testing())
        .provider(provider)
        .credential_selector(selector)
        .build()
        .unwrap();

    let lease = manager.connect(&endpoint(), &integrity()).await.unwrap();
    assert_eq!(lease.local_principal(), Some(&alice));
    drop(lease);
    assert_eq!(manager.reap_now(), 0);

    store.remove(&alice);
    assert_eq!(manager.reap_now(), 1);
}

/// Store that, while being queried, checks the pool is still usable from
/// another thread.
#[derive(Default)]
struct ObservingStore {
    inner: InMemoryCredentialStore,
    manager: parking_lot::Mutex<Option<ConnectionManager>>,
    pool_blocked: std::sync::atomic::AtomicBool,
}

impl crate::ports::CredentialStore for ObservingStore {
    fn entries(&self, kind: crate::domain::PrincipalType) -> Vec<CredentialEntry> {
        let manager = self.manager.lock().clone();
        if let Some(manager) = manager {
            let (tx, rx) = std::sync::mpsc::channel();
            std::thread::spawn(move || {
                let _ = tx.send(manager.stats());
            });
            if rx.recv_timeout(Duration::from_secs(2)).is_err() {
                self.pool_blocked
                    .store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }
        crate::ports::CredentialStore::entries(&self.inner, kind)
    }
}

#[tokio::test]
async fn test_credential_revalidation_does_not_hold_the_pool() {
    let time = ControlledTimeSource::new(0);
    let alice = Principal::x500("CN=alice");
    let store = Arc::new(ObservingStore::default());
    store.inner.insert(CredentialEntry::new(
        alice.clone(),
        CredentialMaterial::Kerberos {
            key: Zeroizing::new([0u8; 32]),
        },
        ValidityWindow::unbounded(),
    ));
    let selector = Arc::new(CredentialSelector::new(
        store.clone(),
        Arc::new(AllowAll),
        Arc::new(time.clone()),
    ));
    let provider = Arc::new(
        CountingProvider::new(tag(), Arc::new(time.clone())).with_client(alice.clone()),
    );
    let manager = ConnectionManager::builder(Arc::new(time))
        .config(ConnectionManagerConfig::for_testing())
        .provider(provider)
        .credential_selector(selector)
        .build()
        .unwrap();

    drop(manager.connect(&endpoint(), &integrity()).await.unwrap());
    *store.manager.lock() = Some(manager.clone());

    assert_eq!(manager.reap_now(), 0);
    assert!(!store.pool_blocked.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(manager.stats().established, 1);

    store.manager.lock().take();
    manager.shutdown();
}

// =============================================================================
// LEASES
// =============================================================================

#[tokio::test]
async fn test_lease_round_trip() {
    let (manager, _provider, _time) = setup();
    let lease = manager.connect(&endpoint(), &integrity()).await.unwrap();

    lease.send(b"ping").await.unwrap();
    assert_eq!(lease.recv().await.unwrap(), b"ping");
    assert_eq!(lease.call(b"pong").await.unwrap(), b"pong");
    assert!(lease.send_dgc(b"dirty").await.unwrap());
    assert_eq!(lease.recv().await.unwrap(), b"dirty");
    assert!(lease.peer().is_some());
}

#[tokio::test]
async fn test_leases_sharing_a_connection_get_their_own_replies() {
    let (manager, provider, _time) = setup();
    let first = manager.connect(&endpoint(), &integrity()).await.unwrap();
    let second = manager.connect(&endpoint(), &integrity()).await.unwrap();
    assert_eq!(first.id(), second.id());
    assert_eq!(provider.connects(), 1);

    for round in 0..20u8 {
        let (msg_a, msg_b) = ([b'a', round], [b'b', round]);
        let (a, b) = tokio::join!(first.call(&msg_a), second.call(&msg_b));
        assert_eq!(a.unwrap(), vec![b'a', round]);
        assert_eq!(b.unwrap(), vec![b'b', round]);
    }
}

#[tokio::test]
async fn test_failed_io_tears_connection_down() {
    let time = ControlledTimeSource::new(0);
    let provider =
        Arc::new(CountingProvider::new(tag(), Arc::new(time.clone())).with_dead_peer());
    let manager = manager_with(Arc::clone(&provider), &time);

    let lease = manager.connect(&endpoint(), &integrity()).await.unwrap();
    let err = lease.call(b"hello").await.unwrap_err();
    assert!(matches!(err, NegotiationError::ChannelFailure(_)));
    assert_eq!(manager.stats().established, 0);
    drop(lease);

    let again = manager.connect(&endpoint(), &integrity()).await.unwrap();
    assert_eq!(provider.connects(), 2);
    drop(again);
}

// =============================================================================
// SHUTDOWN AND BUILD
// =============================================================================

#[tokio::test]
async fn test_shutdown_refuses_new_requests() {
    let (manager, _provider, _time) = setup();
    drop(manager.connect(&endpoint(), &integrity()).await.unwrap());

    let api: &dyn SecureEndpointApi = &manager;
    api.shutdown();
    assert_eq!(api.stats(), PoolStats::default());
    assert_eq!(
        api.connect(&endpoint(), &integrity()).await.unwrap_err(),
        NegotiationError::Shutdown
    );
}

/// Let spawned close tasks run until `provider` has seen `expected` closes.
async fn closes_reach(provider: &CountingProvider, expected: usize) -> bool {
    for _ in 0..100 {
        if provider.closes() >= expected {
            return true;
        }
        tokio::task::yield_now().await;
    }
    provider.closes() >= expected
}

#[tokio::test]
async fn test_closed_connections_close_their_channel() {
    let (manager, provider, time) = setup();

    drop(manager.connect(&endpoint(), &integrity()).await.unwrap());
    time.advance(Duration::from_secs(16));
    assert_eq!(manager.reap_now(), 1);
    assert!(closes_reach(&provider, 1).await);

    drop(manager.connect(&endpoint(), &integrity()).await.unwrap());
    assert_eq!(provider.connects(), 2);
    manager.shutdown();
    assert!(closes_reach(&provider, 2).await);

    // Each channel is closed exactly once.
    assert_eq!(manager.reap_now(), 0);
    tokio::task::yield_now().await;
    assert_eq!(provider.closes(), 2);
}

#[test]
fn test_duplicate_provider_rejected() {
    let time = ControlledTimeSource::new(0);
    let result = ConnectionManager::builder(Arc::new(time.clone()))
        .provider(Arc::new(CountingProvider::new(tag(), Arc::new(time.clone()))))
        .provider(Arc::new(CountingProvider::new(tag(), Arc::new(time))))
        .build();
    assert!(result.is_err());
}

#[test]
fn test_config_validation() {
    struct TestCase {
        name: &'static str,
        config: ConnectionManagerConfig,
        valid: bool,
    }

    let cases = vec![
        TestCase {
            name: "defaults",
            config: ConnectionManagerConfig::default(),
            valid: true,
        },
        TestCase {
            name: "zero reap interval",
            config: ConnectionManagerConfig {
                reap_interval: Duration::ZERO,
                ..Default::default()
            },
            valid: false,
        },
        TestCase {
            name: "zero connect timeout",
            config: ConnectionManagerConfig {
                connect_timeout: Duration::ZERO,
                ..Default::default()
            },
            valid: false,
        },
    ];

    for case in cases {
        assert_eq!(case.config.validate().is_ok(), case.valid, "{}", case.name);
    }
}
