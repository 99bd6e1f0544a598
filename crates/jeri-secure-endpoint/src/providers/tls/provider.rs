use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::net::TcpStream;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, info, warn};

use super::config::TlsProviderConfig;
use super::support;
use super::verifier::{subject_principal, ChainOnlyServerVerifier};
use crate::domain::{
    AuthAction, AuthNeed, ConfigError, Constraint, ConstraintKind, ConstraintSet,
    CredentialMaterial, Endpoint, HandshakeError, ListenEndpoint, NegotiatedIdentity,
    NegotiationError, Principal, PrincipalType, ProviderTag, Role, SelectionCriteria,
    SessionProperties,
};
use crate::ports::{HostResolver, SocketConnector};
use crate::providers::{
    expected_server_principal, open_socket, satisfied_subset, with_deadline, Connection,
    FramedChannel, SecurityProvider,
};
use crate::service::CredentialSelector;

/// TLS-style security provider.
pub struct TlsProvider {
    config: TlsProviderConfig,
    roots: Arc<RootCertStore>,
    selector: Arc<CredentialSelector>,
    resolver: Arc<dyn HostResolver>,
    connector: Arc<dyn SocketConnector>,
}

impl TlsProvider {
    /// Build a provider trusting `trust_anchors` (DER certificates).
    pub fn new(
        config: TlsProviderConfig,
        trust_anchors: &[Vec<u8>],
        selector: Arc<CredentialSelector>,
        resolver: Arc<dyn HostResolver>,
        connector: Arc<dyn SocketConnector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut roots = RootCertStore::empty();
        for der in trust_anchors {
            roots
                .add(CertificateDer::from(der.clone()))
                .map_err(|e| ConfigError::Invalid(format!("bad trust anchor: {e}")))?;
        }
        if roots.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one trust anchor is required".to_string(),
            ));
        }
        Ok(Self {
            config,
            roots: Arc::new(roots),
            selector,
            resolver,
            connector,
        })
    }

    pub fn config(&self) -> &TlsProviderConfig {
        &self.config
    }

    fn client_config(&self, identity: &NegotiatedIdentity) -> Result<ClientConfig, HandshakeError> {
        let provider = Arc::new(self.config.crypto_provider());
        let verifier = Arc::new(ChainOnlyServerVerifier::new(
            Arc::clone(&self.roots),
            provider.signature_verification_algorithms,
        ));
        let builder = ClientConfig::builder_with_provider(provider)
            .with_protocol_versions(&self.versions()?)
            .map_err(|e| HandshakeError::Protocol(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(verifier);

        match identity.credential() {
            None => Ok(builder.with_no_client_auth()),
            Some(entry) => {
                let (chain, key) = x509_material(&entry.material)?;
                builder
                    .with_client_auth_cert(chain, key)
                    .map_err(|e| HandshakeError::Credential(e.to_string()))
            }
        }
    }

    fn server_config(&self, identity: &NegotiatedIdentity) -> Result<ServerConfig, HandshakeError> {
        let entry = identity.credential().ok_or_else(|| {
            HandshakeError::Credential("TLS servers must authenticate".to_string())
        })?;
        let (chain, key) = x509_material(&entry.material)?;
        let provider = Arc::new(self.config.crypto_provider());
        let client_verifier =
            WebPkiClientVerifier::builder_with_provider(Arc::clone(&self.roots), provider.clone())
                .allow_unauthenticated()
                .build()
                .map_err(|e| HandshakeError::Protocol(e.to_string()))?;

        ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&self.versions()?)
            .map_err(|e| HandshakeError::Protocol(e.to_string()))?
            .with_client_cert_verifier(client_verifier)
            .with_single_cert(chain, key)
            .map_err(|e| HandshakeError::Credential(e.to_string()))
    }

    fn versions(&self) -> Result<Vec<&'static rustls::SupportedProtocolVersion>, HandshakeError> {
        self.config
            .protocol_versions()
            .map_err(|e| HandshakeError::Protocol(e.to_string()))
    }

    async fn handshake_client(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
        identity: &NegotiatedIdentity,
    ) -> Result<Connection, NegotiationError> {
        let tcp = open_socket(&*self.resolver, &*self.connector, endpoint).await?;
        let peer_addr = tcp.peer_addr()?;
        let connector = TlsConnector::from(Arc::new(self.client_config(identity)?));
        let server_name = ServerName::try_from(endpoint.host().to_string())
            .map_err(|e| HandshakeError::Protocol(format!("bad server name: {e}")))?;

        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(classify_tls_error)?;

        let server = {
            let (_, session) = tls.get_ref();
            let leaf = session
                .peer_certificates()
                .and_then(|certs| certs.first())
                .ok_or_else(|| {
                    HandshakeError::Authentication("server presented no certificate".to_string())
                })?;
            subject_principal(leaf.as_ref())?
        };

        if let Some(expected) = expected_server_principal(endpoint, constraints) {
            if expected != server {
                warn!(%endpoint, %expected, actual = %server, "server principal mismatch");
                return Err(NegotiationError::unsupported_reason(format!(
                    "server authenticated as {server}, expected {expected}"
                )));
            }
        }

        let properties = SessionProperties {
            client: identity.principal().cloned(),
            server: Some(server.clone()),
            confidentiality: true,
            integrity: true,
            delegation: false,
        };
        let satisfied = satisfied_subset(&properties, constraints)?;
        let now = self.selector.now();

        info!(%endpoint, local = %identity, %server, "TLS session established");
        Ok(Connection {
            channel: Box::new(FramedChannel::new(tls)),
            properties,
            satisfied,
            local: identity.clone(),
            peer: Some(server),
            peer_addr,
            established_at: now,
            session_expires_at: now.saturating_add(self.config.max_client_session_duration),
        })
    }
}

#[async_trait]
impl SecurityProvider for TlsProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::TLS
    }

    fn principal_type(&self) -> PrincipalType {
        PrincipalType::X500
    }

    fn supported_kinds(&self) -> BTreeSet<ConstraintKind> {
        support::supported_kinds()
    }

    fn supports(&self, constraint: &Constraint, context: &ConstraintSet) -> bool {
        support::supports(constraint, context)
    }

    fn max_session_duration(&self, role: Role) -> Duration {
        match role {
            Role::Client => self.config.max_client_session_duration,
            Role::Server => self.config.max_server_session_duration,
        }
    }

    fn handshake_timeout(&self) -> Duration {
        self.config.handshake_timeout
    }

    fn client_identity(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
    ) -> Result<NegotiatedIdentity, NegotiationError> {
        let criteria = SelectionCriteria::for_client(
            constraints,
            PrincipalType::X500,
            support::client_auth_need(constraints),
            expected_server_principal(endpoint, constraints),
        );
        self.selector.select(&criteria)
    }

    async fn connect(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
        identity: &NegotiatedIdentity,
    ) -> Result<Connection, NegotiationError> {
        let now = self.selector.now();
        let budget = constraints
            .connect_deadline(now, self.config.handshake_timeout)
            .remaining_from(now);
        debug!(%endpoint, local = %identity, ?budget, "starting TLS handshake");
        with_deadline(budget, self.handshake_client(endpoint, constraints, identity)).await
    }

    fn server_identity(
        &self,
        endpoint: &ListenEndpoint,
    ) -> Result<NegotiatedIdentity, NegotiationError> {
        let mut criteria =
            SelectionCriteria::new(PrincipalType::X500, AuthAction::Listen, AuthNeed::Required);
        if let Some(principal) = endpoint.server_principal() {
            criteria = criteria.with_required(principal.clone());
        }
        self.selector.select(&criteria)
    }

    async fn accept(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        identity: &NegotiatedIdentity,
    ) -> Result<Connection, NegotiationError> {
        let acceptor = TlsAcceptor::from(Arc::new(self.server_config(identity)?));
        let budget = self.config.handshake_timeout;
        let tls = with_deadline(budget, async {
            acceptor
                .accept(stream)
                .await
                .map_err(|e| NegotiationError::from(classify_tls_error(e)))
        })
        .await?;

        let client: Option<Principal> = {
            let (_, session) = tls.get_ref();
            session
                .peer_certificates()
                .and_then(|certs| certs.first())
                .map(|leaf| subject_principal(leaf.as_ref()))
                .transpose()?
        };

        let properties = SessionProperties {
            client: client.clone(),
            server: identity.principal().cloned(),
            confidentiality: true,
            integrity: true,
            delegation: false,
        };
        let now = self.selector.now();
        debug!(%peer_addr, client = ?client, "TLS session accepted");
        Ok(Connection {
            channel: Box::new(FramedChannel::new(tls)),
            properties,
            satisfied: ConstraintSet::empty(),
            local: identity.clone(),
            peer: client,
            peer_addr,
            established_at: now,
            session_expires_at: now.saturating_add(self.config.max_server_session_duration),
        })
    }
}

fn x509_material(
    material: &CredentialMaterial,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), HandshakeError> {
    match material {
        CredentialMaterial::X509 { chain, private_key } => Ok((
            chain.iter().map(|c| CertificateDer::from(c.clone())).collect(),
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(private_key.to_vec())),
        )),
        CredentialMaterial::Kerberos { .. } => Err(HandshakeError::Credential(
            "not an X.509 credential".to_string(),
        )),
    }
}

/// rustls failures surface as I/O errors wrapping a `rustls::Error`.
fn classify_tls_error(err: io::Error) -> HandshakeError {
    match err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        Some(tls) => HandshakeError::Authentication(tls.to_string()),
        None => err.into(),
    }
}
