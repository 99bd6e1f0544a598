//! Unicast discovery against real sockets.

use jeri_secure_endpoint::discovery::TLS_DISCOVERY_FORMAT;
use jeri_secure_endpoint::{
    bridge_for_format, ConstraintSet, DiscoveryError, LocatorError, NegotiationError,
    ProviderTag, DEFAULT_DISCOVERY_PORT,
};

use super::fixtures::{discovery, lookup_service, refused_addr, registrar_proxy};

#[tokio::test]
async fn test_first_reachable_address_wins_and_bridges_to_tls() {
    let refused = refused_addr().await;
    let lookup = lookup_service(registrar_proxy(), vec!["a".to_string(), "b".to_string()]).await;

    let result = discovery(vec![refused, lookup])
        .discover_url("jini://lookup.example/")
        .await
        .unwrap();
    assert_eq!(result.addr, lookup);
    assert_eq!(result.locator.port(), DEFAULT_DISCOVERY_PORT);
    assert_eq!(result.groups, vec!["a".to_string(), "b".to_string()]);
    assert!(result.registrar.same_kind(&registrar_proxy()));

    let bridge = bridge_for_format(TLS_DISCOVERY_FORMAT).unwrap();
    let endpoint = bridge.endpoint(&result, &ConstraintSet::empty()).unwrap();
    assert_eq!(endpoint.host(), result.locator.host());
    assert_eq!(endpoint.port(), result.locator.port());
    assert_eq!(endpoint.provider(), &ProviderTag::TLS);
    assert_eq!(endpoint.server_principal(), None);
}

#[tokio::test]
async fn test_discovery_failures() {
    struct TestCase {
        name: &'static str,
        url: &'static str,
        check: fn(&DiscoveryError) -> bool,
    }

    let cases = vec![
        TestCase {
            name: "port out of range",
            url: "jini://lookup.example:99999/",
            check: |e| matches!(e, DiscoveryError::Locator(LocatorError::PortOutOfRange(99999))),
        },
        TestCase {
            name: "wrong scheme",
            url: "http://lookup.example/",
            check: |e| matches!(e, DiscoveryError::Locator(LocatorError::UnsupportedScheme(_))),
        },
        TestCase {
            name: "nobody answers",
            url: "jini://lookup.example/",
            check: |e| {
                matches!(
                    e,
                    DiscoveryError::Negotiation(NegotiationError::DiscoveryFailure(_))
                )
            },
        },
    ];

    let refused = refused_addr().await;
    for case in cases {
        let err = discovery(vec![refused])
            .discover_url(case.url)
            .await
            .unwrap_err();
        assert!((case.check)(&err), "{}: unexpected error {err}", case.name);
    }
}

#[test]
fn test_unknown_discovery_format_has_no_bridge() {
    assert!(bridge_for_format("net.jini.discovery.plaintext").is_none());
}
