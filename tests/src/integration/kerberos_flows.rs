//! Discovery of a lookup service followed by a Kerberos session to it.

use std::sync::Arc;

use jeri_secure_endpoint::discovery::KERBEROS_DISCOVERY_FORMAT;
use jeri_secure_endpoint::{
    bridge_for_format, Constraint, ConstraintSet, ConnectionManager, ListenEndpoint,
    ProviderTag, SystemTimeSource,
};

use super::fixtures::{
    discovery, lookup_service, refused_addr, registrar_proxy, selector, start_listener, Realm,
};

#[tokio::test]
async fn test_discovered_lookup_service_is_reached_over_kerberos() {
    let realm = Realm::new();
    let service_selector = selector(vec![realm.service.clone()]);
    let server = start_listener(
        ListenEndpoint::new("127.0.0.1", 0, ProviderTag::KERBEROS)
            .with_server_principal(realm.service.principal.clone()),
        realm.provider(service_selector.clone(), vec![]),
        service_selector,
    )
    .await;

    let refused = refused_addr().await;
    let lookup = lookup_service(registrar_proxy(), vec!["public".to_string()]).await;
    let result = discovery(vec![refused, lookup])
        .discover_url("jini://lookup.example/")
        .await
        .unwrap();
    assert_eq!(result.addr, lookup);
    assert_eq!(result.groups, vec!["public".to_string()]);

    let constraints = ConstraintSet::requiring([
        Constraint::server_min_principal([realm.service.principal.clone()]).unwrap(),
        Constraint::Confidentiality(true),
    ])
    .unwrap();
    let bridge = bridge_for_format(KERBEROS_DISCOVERY_FORMAT).unwrap();
    let endpoint = bridge.endpoint(&result, &constraints).unwrap();
    assert_eq!(endpoint.server_principal(), Some(&realm.service.principal));

    // The bridge names the discovered host; resolve it to the listener.
    let client = realm.provider(selector(vec![realm.alice.clone()]), vec![server.addr]);
    let manager = ConnectionManager::builder(Arc::new(SystemTimeSource::new()))
        .provider(client)
        .build()
        .unwrap();

    let lease = manager.connect(&endpoint, &constraints).await.unwrap();
    assert_eq!(lease.peer(), Some(&realm.service.principal));
    assert_eq!(lease.local_principal(), Some(&realm.alice.principal));
    assert!(lease.properties().confidentiality);
    assert_eq!(lease.call(b"lookup").await.unwrap(), b"lookup".to_vec());

    let contexts = server.dispatcher.contexts();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].peer, Some(realm.alice.principal.clone()));

    drop(lease);
    manager.shutdown();
    server.handle.shutdown();
}

#[tokio::test]
async fn test_kerberos_bridge_requires_a_peer_principal() {
    let lookup = lookup_service(registrar_proxy(), vec![]).await;
    let result = discovery(vec![lookup])
        .discover_url("jini://lookup.example/")
        .await
        .unwrap();

    let bridge = bridge_for_format(KERBEROS_DISCOVERY_FORMAT).unwrap();
    let err = bridge
        .endpoint(&result, &ConstraintSet::empty())
        .unwrap_err();
    assert!(err.is_unsupported(), "unexpected error: {err}");
}
