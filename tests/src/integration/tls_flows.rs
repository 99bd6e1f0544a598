//! TLS client and listener end to end through the connection manager.

use std::sync::Arc;

use jeri_secure_endpoint::{
    Constraint, ConstraintSet, ConnectionManager, Endpoint, ListenEndpoint, ProviderTag,
    SecureEndpointApi, SystemTimeSource, Timestamp, ValidityWindow,
};

use super::fixtures::{refused_addr, selector, start_listener, Authority};

fn manager(provider: Arc<jeri_secure_endpoint::TlsProvider>) -> ConnectionManager {
    ConnectionManager::builder(Arc::new(SystemTimeSource::new()))
        .provider(provider)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_mutually_authenticated_call_and_reuse() {
    let ca = Authority::new("Integration CA");
    let server_cred = ca.issue("server");
    let alice = ca.issue("alice");

    let server_selector = selector(vec![server_cred.clone()]);
    let server = start_listener(
        ListenEndpoint::new("127.0.0.1", 0, ProviderTag::TLS),
        ca.provider(server_selector.clone()),
        server_selector,
    )
    .await;

    let manager = manager(ca.provider(selector(vec![alice.clone()])));
    let endpoint = Endpoint::new("127.0.0.1", server.addr.port(), ProviderTag::TLS);
    let constraints = ConstraintSet::requiring([
        Constraint::ClientAuthentication(true),
        Constraint::Confidentiality(true),
    ])
    .unwrap();

    let first_id = {
        let lease = manager.connect(&endpoint, &constraints).await.unwrap();
        assert_eq!(lease.local_principal(), Some(&alice.principal));
        assert_eq!(lease.peer(), Some(&server_cred.principal));
        assert_eq!(lease.call(b"hello").await.unwrap(), b"hello".to_vec());
        lease.id()
    };

    let lease = manager.connect(&endpoint, &constraints).await.unwrap();
    assert_eq!(lease.id(), first_id);
    assert_eq!(lease.call(b"again").await.unwrap(), b"again".to_vec());

    let contexts = server.dispatcher.contexts();
    assert_eq!(contexts.len(), 1);
    assert_eq!(contexts[0].peer, Some(alice.principal.clone()));
    assert_eq!(contexts[0].local, Some(server_cred.principal.clone()));

    drop(lease);
    manager.shutdown();
    server.handle.shutdown();
}

#[tokio::test]
async fn test_client_authentication_needs_a_usable_credential() {
    struct TestCase {
        name: &'static str,
        validity: Option<ValidityWindow>,
    }

    let cases = vec![
        TestCase {
            name: "empty store",
            validity: None,
        },
        TestCase {
            name: "expired credential",
            validity: Some(ValidityWindow::new(
                Timestamp::from_millis(0),
                Timestamp::from_secs(1),
            )),
        },
    ];

    let ca = Authority::new("Integration CA");
    let port = refused_addr().await.port();
    let endpoint = Endpoint::new("127.0.0.1", port, ProviderTag::TLS);
    let constraints = ConstraintSet::requiring([Constraint::ClientAuthentication(true)]).unwrap();

    for case in cases {
        let entries = case
            .validity
            .map(|validity| vec![ca.issue_valid("alice", validity)])
            .unwrap_or_default();
        let manager = manager(ca.provider(selector(entries)));
        let api: &dyn SecureEndpointApi = &manager;
        let err = api.connect(&endpoint, &constraints).await.unwrap_err();
        assert!(err.is_unsupported(), "{}: unexpected error {err}", case.name);
        assert_eq!(api.stats().established, 0, "{}", case.name);
    }
}
