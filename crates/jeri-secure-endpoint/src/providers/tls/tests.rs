use super::*;

use std::sync::Arc;
use std::time::Duration;

use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use tokio::net::TcpListener;

use crate::adapters::{
    AllowAll, InMemoryCredentialStore, SystemTimeSource, TcpSocketConnector, TokioHostResolver,
};
use crate::domain::{
    Constraint, ConstraintSet, CredentialEntry, CredentialMaterial, Endpoint, HandshakeError,
    ListenEndpoint, NegotiationError, Principal, ProviderTag, ValidityWindow,
};
use crate::providers::SecurityProvider;
use crate::service::CredentialSelector;
use zeroize::Zeroizing;

// =============================================================================
// FIXTURES
// =============================================================================

struct Authority {
    cert: Certificate,
    key: KeyPair,
}

impl Authority {
    fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }

    /// Leaf credential whose principal is taken from the issued certificate.
    fn issue(&self, common_name: &str) -> CredentialEntry {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, common_name);
        params.distinguished_name = dn;
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        let cert = params.signed_by(&key, &self.cert, &self.key).unwrap();
        let der = cert.der().to_vec();
        CredentialEntry::new(
            subject_principal(&der).unwrap(),
            CredentialMaterial::X509 {
                chain: vec![der],
                private_key: Zeroizing::new(key.serialize_der()),
            },
            ValidityWindow::unbounded(),
        )
    }
}

fn provider(anchors: &[Vec<u8>], entries: Vec<CredentialEntry>) -> TlsProvider {
    let selector = Arc::new(CredentialSelector::new(
        Arc::new(InMemoryCredentialStore::with_entries(entries)),
        Arc::new(AllowAll),
        Arc::new(SystemTimeSource::new()),
    ));
    TlsProvider::new(
        TlsProviderConfig::for_testing(),
        anchors,
        selector,
        Arc::new(TokioHostResolver),
        Arc::new(TcpSocketConnector::new(Duration::from_secs(5))),
    )
    .unwrap()
}

/// Accept one connection, echo one frame, return the client principal seen.
async fn serve_once(
    server: Arc<TlsProvider>,
    listener: TcpListener,
) -> tokio::task::JoinHandle<Result<Option<Principal>, NegotiationError>> {
    let listen = ListenEndpoint::new("127.0.0.1", 0, ProviderTag::TLS);
    tokio::spawn(async move {
        let identity = server.server_identity(&listen)?;
        let (stream, addr) = listener.accept().await?;
        let mut conn = server.accept(stream, addr, &identity).await?;
        if let Some(frame) = conn.channel.recv().await? {
            conn.channel.send(&frame).await?;
        }
        Ok(conn.peer)
    })
}

async fn bound() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

// =============================================================================
// HANDSHAKE
// =============================================================================

#[tokio::test]
async fn test_mutual_authentication_round_trip() {
    let ca = Authority::new("Test CA");
    let server_cred = ca.issue("server");
    let alice = ca.issue("alice");
    let alice_principal = alice.principal.clone();

    let server = Arc::new(provider(&[ca.der()], vec![server_cred.clone()]));
    let client = provider(&[ca.der()], vec![alice]);

    let (listener, port) = bound().await;
    let task = serve_once(server, listener).await;

    let endpoint = Endpoint::new("127.0.0.1", port, ProviderTag::TLS);
    let constraints = ConstraintSet::requiring([Constraint::ClientAuthentication(true)]).unwrap();
    let reduced = client.reduce(&constraints).unwrap();
    let identity = client.client_identity(&endpoint, &reduced).unwrap();
    assert_eq!(identity.principal(), Some(&alice_principal));

    let mut conn = client.connect(&endpoint, &reduced, &identity).await.unwrap();
    assert_eq!(conn.peer, Some(server_cred.principal.clone()));
    assert!(conn.properties.confidentiality);
    assert!(conn.satisfied.requires(&Constraint::ClientAuthentication(true)));

    conn.channel.send(b"ping").await.unwrap();
    assert_eq!(conn.channel.recv().await.unwrap(), Some(b"ping".to_vec()));

    let seen = task.await.unwrap().unwrap();
    assert_eq!(seen, Some(alice_principal));
}

#[tokio::test]
async fn test_forbidden_client_auth_stays_anonymous() {
    let ca = Authority::new("Test CA");
    let server = Arc::new(provider(&[ca.der()], vec![ca.issue("server")]));
    let client = provider(&[ca.der()], vec![ca.issue("alice")]);

    let (listener, port) = bound().await;
    let task = serve_once(server, listener).await;

    let endpoint = Endpoint::new("127.0.0.1", port, ProviderTag::TLS);
    let constraints = ConstraintSet::requiring([Constraint::ClientAuthentication(false)]).unwrap();
    let identity = client.client_identity(&endpoint, &constraints).unwrap();
    assert!(identity.is_anonymous());

    let mut conn = client.connect(&endpoint, &constraints, &identity).await.unwrap();
    assert_eq!(conn.properties.client, None);
    conn.channel.send(b"x").await.unwrap();
    conn.channel.recv().await.unwrap();

    assert_eq!(task.await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn test_server_principal_mismatch_is_unsupported() {
    let ca = Authority::new("Test CA");
    let server = Arc::new(provider(&[ca.der()], vec![ca.issue("server")]));
    let client = provider(&[ca.der()], vec![]);

    let (listener, port) = bound().await;
    let _task = serve_once(server, listener).await;

    let endpoint = Endpoint::new("127.0.0.1", port, ProviderTag::TLS)
        .with_server_principal(Principal::x500("CN=someone-else"));
    let constraints = ConstraintSet::empty();
    let identity = client.client_identity(&endpoint, &constraints).unwrap();

    let err = client
        .connect(&endpoint, &constraints, &identity)
        .await
        .unwrap_err();
    assert!(err.is_unsupported(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_untrusted_server_fails_authentication() {
    let trusted = Authority::new("Trusted CA");
    let rogue = Authority::new("Rogue CA");
    let server = Arc::new(provider(&[rogue.der()], vec![rogue.issue("server")]));
    let client = provider(&[trusted.der()], vec![]);

    let (listener, port) = bound().await;
    let _task = serve_once(server, listener).await;

    let endpoint = Endpoint::new("127.0.0.1", port, ProviderTag::TLS);
    let constraints = ConstraintSet::empty();
    let identity = client.client_identity(&endpoint, &constraints).unwrap();
    let err = client
        .connect(&endpoint, &constraints, &identity)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            NegotiationError::HandshakeFailure(HandshakeError::Authentication(_))
        ),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_relative_time_bounds_the_handshake() {
    let ca = Authority::new("Test CA");
    let client = provider(&[ca.der()], vec![]);

    // Accepts the socket but never answers the handshake.
    let (listener, port) = bound().await;
    let _hold = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let endpoint = Endpoint::new("127.0.0.1", port, ProviderTag::TLS);
    let constraints = ConstraintSet::requiring([Constraint::ConnectionRelativeTime(
        Duration::from_millis(200),
    )])
    .unwrap();
    let identity = client.client_identity(&endpoint, &constraints).unwrap();
    let err = client
        .connect(&endpoint, &constraints, &identity)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        NegotiationError::HandshakeFailure(HandshakeError::TimedOut(_))
    ));
}

#[test]
fn test_required_client_auth_without_credentials_is_unsupported() {
    let ca = Authority::new("Test CA");
    let client = provider(&[ca.der()], vec![]);
    let endpoint = Endpoint::new("127.0.0.1", 1, ProviderTag::TLS);
    let constraints = ConstraintSet::requiring([Constraint::ClientAuthentication(true)]).unwrap();

    let err = client.client_identity(&endpoint, &constraints).unwrap_err();
    assert!(err.is_unsupported());
}

// =============================================================================
// SUPPORT MATRIX
// =============================================================================

#[test]
fn test_support_matrix() {
    struct TestCase {
        name: &'static str,
        requirements: Vec<Constraint>,
        supported: bool,
    }

    let x500 = Principal::x500("CN=a");
    let krb = Principal::kerberos("a@REALM");
    let cases = vec![
        TestCase {
            name: "integrity yes",
            requirements: vec![Constraint::Integrity(true)],
            supported: true,
        },
        TestCase {
            name: "integrity no",
            requirements: vec![Constraint::Integrity(false)],
            supported: false,
        },
        TestCase {
            name: "confidentiality no",
            requirements: vec![Constraint::Confidentiality(false)],
            supported: false,
        },
        TestCase {
            name: "anonymous server",
            requirements: vec![Constraint::ServerAuthentication(false)],
            supported: false,
        },
        TestCase {
            name: "delegation with anonymous client",
            requirements: vec![
                Constraint::Delegation(true),
                Constraint::ClientAuthentication(false),
            ],
            supported: true,
        },
        TestCase {
            name: "delegation with authenticated client",
            requirements: vec![
                Constraint::Delegation(true),
                Constraint::ClientAuthentication(true),
            ],
            supported: false,
        },
        TestCase {
            name: "x500 server principal",
            requirements: vec![Constraint::server_min_principal([x500.clone()]).unwrap()],
            supported: true,
        },
        TestCase {
            name: "kerberos server principal",
            requirements: vec![Constraint::server_min_principal([krb.clone()]).unwrap()],
            supported: false,
        },
        TestCase {
            name: "client max principal with one x500",
            requirements: vec![Constraint::client_max_principal([x500, krb]).unwrap()],
            supported: true,
        },
        TestCase {
            name: "relative time",
            requirements: vec![Constraint::ConnectionRelativeTime(Duration::from_secs(1))],
            supported: true,
        },
    ];

    let ca = Authority::new("Test CA");
    let tls = provider(&[ca.der()], vec![]);
    for case in cases {
        let set = ConstraintSet::requiring(case.requirements).unwrap();
        let result = tls.reduce(&set);
        assert_eq!(result.is_ok(), case.supported, "case: {}", case.name);
    }
}

#[test]
fn test_alternatives_resolve_to_supported_element() {
    let ca = Authority::new("Test CA");
    let tls = provider(&[ca.der()], vec![]);
    let alt = Constraint::alternatives([Constraint::Integrity(false), Constraint::Integrity(true)])
        .unwrap();
    let reduced = tls.reduce(&ConstraintSet::requiring([alt]).unwrap()).unwrap();
    assert!(reduced.requires(&Constraint::Integrity(true)));
}

#[test]
fn test_client_auth_need() {
    use crate::domain::AuthNeed;

    let need = |reqs: Vec<Constraint>, prefs: Vec<Constraint>| {
        support::client_auth_need(&ConstraintSet::new(reqs, prefs).unwrap())
    };
    assert_eq!(
        need(vec![Constraint::ClientAuthentication(true)], vec![]),
        AuthNeed::Required
    );
    assert_eq!(
        need(vec![], vec![Constraint::ClientAuthentication(false)]),
        AuthNeed::Forbidden
    );
    assert_eq!(need(vec![Constraint::Delegation(true)], vec![]), AuthNeed::Forbidden);
    assert_eq!(need(vec![], vec![]), AuthNeed::Optional);
}

// =============================================================================
// CONFIG
// =============================================================================

#[test]
fn test_config_defaults_validate() {
    let config = TlsProviderConfig::default();
    assert!(config.validate().is_ok());
    assert!(config.max_client_session_duration < config.max_server_session_duration);
}

#[test]
fn test_config_rejects_unknown_protocol_and_trust_algorithm() {
    let bad_protocol = TlsProviderConfig {
        protocol: "SSLv3".to_string(),
        ..TlsProviderConfig::default()
    };
    assert!(bad_protocol.validate().is_err());

    let bad_trust = TlsProviderConfig {
        trust_algorithm: "SunX509".to_string(),
        ..TlsProviderConfig::default()
    };
    assert!(bad_trust.validate().is_err());
}

#[test]
fn test_cipher_suite_selection() {
    let config = TlsProviderConfig {
        cipher_suites: vec!["TLS13_CHACHA20_POLY1305_SHA256".to_string()],
        ..TlsProviderConfig::default()
    };
    let provider = config.crypto_provider();
    assert_eq!(provider.cipher_suites.len(), 1);

    let unknown = TlsProviderConfig {
        cipher_suites: vec!["NOPE".to_string()],
        ..TlsProviderConfig::default()
    };
    assert!(unknown.crypto_provider().cipher_suites.len() > 1);
}

#[test]
fn test_new_requires_trust_anchor() {
    let selector = Arc::new(CredentialSelector::new(
        Arc::new(InMemoryCredentialStore::new()),
        Arc::new(AllowAll),
        Arc::new(SystemTimeSource::new()),
    ));
    let result = TlsProvider::new(
        TlsProviderConfig::default(),
        &[],
        selector,
        Arc::new(TokioHostResolver),
        Arc::new(TcpSocketConnector::default()),
    );
    assert!(result.is_err());
}
