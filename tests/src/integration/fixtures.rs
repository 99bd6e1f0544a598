//! Shared fixtures for the integration flows.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jeri_secure_endpoint::adapters::{
    AllowAll, InMemoryCredentialStore, InMemoryKdc, StaticHostResolver, SystemTimeSource,
    TcpSocketConnector, TokioHostResolver,
};
use jeri_secure_endpoint::discovery::{
    read_request, write_response, CapabilityRegistrarDecoder, UnicastResponse,
};
use jeri_secure_endpoint::providers::tls::subject_principal;
use jeri_secure_endpoint::{
    CredentialEntry, CredentialMaterial, CredentialSelector, DiscoveryConfig, InboundContext,
    KerberosProvider, KerberosProviderConfig, ListenEndpoint, Listener, ListenerHandle,
    Principal, RegistrarProxy, RequestDispatcher, SecureChannel, SecurityProvider, TlsProvider,
    TlsProviderConfig, UnicastDiscovery, ValidityWindow,
};
use parking_lot::Mutex;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use tokio::net::TcpListener;
use zeroize::Zeroizing;

pub const REGISTRAR: &str = "net.jini.core.lookup.ServiceRegistrar";

// =============================================================================
// CREDENTIALS
// =============================================================================

pub fn selector(entries: Vec<CredentialEntry>) -> Arc<CredentialSelector> {
    Arc::new(CredentialSelector::new(
        Arc::new(InMemoryCredentialStore::with_entries(entries)),
        Arc::new(AllowAll),
        Arc::new(SystemTimeSource::new()),
    ))
}

/// Throwaway certificate authority.
pub struct Authority {
    cert: Certificate,
    key: KeyPair,
}

impl Authority {
    pub fn new(name: &str) -> Self {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        Self { cert, key }
    }

    pub fn der(&self) -> Vec<u8> {
        self.cert.der().to_vec()
    }

    pub fn issue(&self, common_name: &str) -> CredentialEntry {
        self.issue_valid(common_name, ValidityWindow::unbounded())
    }

    /// Leaf credential with an explicit store validity window.
    pub fn issue_valid(&self, common_name: &str, validity: ValidityWindow) -> CredentialEntry {
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
            validity,
        )
    }

    /// TLS provider trusting this authority.
    pub fn provider(
        &self,
        selector: Arc<CredentialSelector>,
    ) -> Arc<TlsProvider> {
        Arc::new(
            TlsProvider::new(
                TlsProviderConfig::default(),
                &[self.der()],
                selector,
                Arc::new(TokioHostResolver),
                Arc::new(TcpSocketConnector::new(Duration::from_secs(5))),
            )
            .unwrap(),
        )
    }
}

/// Kerberos realm with a client and a service principal.
pub struct Realm {
    pub kdc: Arc<InMemoryKdc>,
    pub alice: CredentialEntry,
    pub service: CredentialEntry,
}

impl Realm {
    pub fn new() -> Self {
        let kdc = Arc::new(InMemoryKdc::new());
        let alice = Principal::kerberos("alice@EXAMPLE.ORG");
        let service = Principal::kerberos("lookup/lookup.example@EXAMPLE.ORG");
        let alice_key = kdc.register(alice.clone());
        let service_key = kdc.register(service.clone());
        let entry = |principal, key| {
            CredentialEntry::new(
                principal,
                CredentialMaterial::Kerberos { key },
                ValidityWindow::unbounded(),
            )
        };
        Self {
            kdc,
            alice: entry(alice, alice_key),
            service: entry(service, service_key),
        }
    }

    /// Provider resolving every host to `addrs`.
    pub fn provider(
        &self,
        selector: Arc<CredentialSelector>,
        addrs: Vec<SocketAddr>,
    ) -> Arc<KerberosProvider> {
        Arc::new(
            KerberosProvider::new(
                KerberosProviderConfig::default(),
                selector,
                self.kdc.clone(),
                Arc::new(StaticHostResolver::new(addrs)),
                Arc::new(TcpSocketConnector::new(Duration::from_secs(5))),
            )
            .unwrap(),
        )
    }
}

// =============================================================================
// SERVER SIDE
// =============================================================================

/// Records every inbound context and echoes messages until hang-up.
#[derive(Default)]
pub struct EchoDispatcher {
    contexts: Mutex<Vec<InboundContext>>,
}

impl EchoDispatcher {
    pub fn contexts(&self) -> Vec<InboundContext> {
        self.contexts.lock().clone()
    }
}

#[async_trait]
impl RequestDispatcher for EchoDispatcher {
    async fn dispatch(&self, context: InboundContext, mut channel: Box<dyn SecureChannel>) {
        self.contexts.lock().push(context);
        while let Ok(Some(message)) = channel.recv().await {
            if channel.send(&message).await.is_err() {
                break;
            }
        }
    }
}

pub struct RunningListener {
    pub addr: SocketAddr,
    pub handle: ListenerHandle,
    pub dispatcher: Arc<EchoDispatcher>,
}

pub async fn start_listener(
    endpoint: ListenEndpoint,
    provider: Arc<dyn SecurityProvider>,
    selector: Arc<CredentialSelector>,
) -> RunningListener {
    let dispatcher = Arc::new(EchoDispatcher::default());
    let listener = Listener::bind(endpoint, provider, selector, dispatcher.clone())
        .await
        .unwrap();
    let addr = listener.local_addr();
    let handle = listener.handle();
    tokio::spawn(listener.serve());
    RunningListener {
        addr,
        handle,
        dispatcher,
    }
}

/// Lookup service answering every unicast request with `proxy`.
pub async fn lookup_service(proxy: RegistrarProxy, groups: Vec<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let response = UnicastResponse {
        registrar: proxy.encode().unwrap(),
        groups,
    };
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let response = response.clone();
            tokio::spawn(async move {
                if read_request(&mut stream).await.is_ok() {
                    let _ = write_response(&mut stream, &response).await;
                }
            });
        }
    });
    addr
}

/// Unicast discovery over `addrs`, knowing only the registrar capability.
pub fn discovery(addrs: Vec<SocketAddr>) -> UnicastDiscovery {
    UnicastDiscovery::new(
        DiscoveryConfig {
            timeout: Duration::from_secs(2),
            ..DiscoveryConfig::default()
        },
        Arc::new(StaticHostResolver::new(addrs)),
        Arc::new(TcpSocketConnector::new(Duration::from_secs(2))),
        Arc::new(|_: &SocketAddr| true),
        Arc::new(CapabilityRegistrarDecoder::new([REGISTRAR])),
    )
}

pub fn registrar_proxy() -> RegistrarProxy {
    RegistrarProxy::new([REGISTRAR], b"registrar".to_vec())
}

/// Address nothing listens on.
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}
