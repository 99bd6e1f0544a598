use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::channel::KerberosChannel;
use super::config::KerberosProviderConfig;
use super::exchange::{recv_message, send_message, KrbMessage};
use super::replay::ReplayCache;
use super::support;
use super::ticket::{open_record, seal_record, ApReply, Authenticator, Ticket};
use crate::domain::{
    AuthAction, AuthNeed, ConfigError, Constraint, ConstraintKind, ConstraintSet,
    CredentialMaterial, Endpoint, HandshakeError, ListenEndpoint, NegotiatedIdentity,
    NegotiationError, Principal, PrincipalType, ProviderTag, Role, SelectionCriteria,
    SessionProperties, Timestamp,
};
use crate::ports::{HostResolver, KeyDistributionCenter, SocketConnector};
use crate::providers::{
    expected_server_principal, open_socket, satisfied_subset, with_deadline, Connection,
    SecurityProvider,
};
use crate::service::CredentialSelector;

/// Kerberos-style security provider.
pub struct KerberosProvider {
    config: KerberosProviderConfig,
    selector: Arc<CredentialSelector>,
    kdc: Arc<dyn KeyDistributionCenter>,
    resolver: Arc<dyn HostResolver>,
    connector: Arc<dyn SocketConnector>,
    replay: Mutex<ReplayCache>,
}

impl KerberosProvider {
    pub fn new(
        config: KerberosProviderConfig,
        selector: Arc<CredentialSelector>,
        kdc: Arc<dyn KeyDistributionCenter>,
        resolver: Arc<dyn HostResolver>,
        connector: Arc<dyn SocketConnector>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let replay = Mutex::new(ReplayCache::new(config.max_clock_skew));
        Ok(Self {
            config,
            selector,
            kdc,
            resolver,
            connector,
            replay,
        })
    }

    pub fn config(&self) -> &KerberosProviderConfig {
        &self.config
    }

    async fn handshake_client(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
        identity: &NegotiatedIdentity,
        server: Principal,
    ) -> Result<Connection, NegotiationError> {
        let (client, client_key) = kerberos_key(identity)?;
        let now = self.selector.now();
        let grant = self.kdc.issue_ticket(
            client,
            client_key,
            &server,
            now,
            self.config.ticket_lifetime,
        )?;

        let mechanism = support::choose_mechanism(&self.config, constraints);
        let authenticator = Authenticator {
            client: client.clone(),
            timestamp: now,
            mechanism,
            delegation: support::wants_delegation(constraints),
        };
        let sealed = seal_record(&grant.session_key, &authenticator)?;

        let mut stream = open_socket(&*self.resolver, &*self.connector, endpoint).await?;
        let peer_addr = stream.peer_addr()?;
        send_message(
            &mut stream,
            &KrbMessage::ApReq {
                ticket: grant.ticket.clone(),
                authenticator: sealed,
            },
        )
        .await?;

        let delegation = match recv_message(&mut stream).await? {
            KrbMessage::ApRep { reply } => {
                let reply: ApReply = open_record(&grant.session_key, &reply)?;
                if reply.timestamp != authenticator.timestamp {
                    return Err(HandshakeError::Authentication(
                        "server reply does not match authenticator".to_string(),
                    )
                    .into());
                }
                authenticator.delegation && reply.delegation
            }
            KrbMessage::Error { reason } => {
                return Err(HandshakeError::Authentication(reason).into());
            }
            KrbMessage::ApReq { .. } => {
                return Err(
                    HandshakeError::Protocol("unexpected AP-REQ from server".into()).into(),
                );
            }
        };

        let properties = SessionProperties {
            client: Some(client.clone()),
            server: Some(server.clone()),
            confidentiality: mechanism.confidential(),
            integrity: true,
            delegation,
        };
        let satisfied = satisfied_subset(&properties, constraints)?;
        let session_expires_at = now
            .saturating_add(self.config.max_server_session_duration)
            .min(grant.expires_at);

        info!(%endpoint, %client, %server, %mechanism, "kerberos session established");
        Ok(Connection {
            channel: Box::new(KerberosChannel::new(
                stream,
                Zeroizing::new(*grant.session_key),
                mechanism,
                Role::Client,
            )),
            properties,
            satisfied,
            local: identity.clone(),
            peer: Some(server),
            peer_addr,
            established_at: now,
            session_expires_at,
        })
    }

    /// Validate an AP-REQ. Errors are reported to the client before returning.
    fn verify_request(
        &self,
        identity: &NegotiatedIdentity,
        ticket: &[u8],
        authenticator: &[u8],
        now: Timestamp,
    ) -> Result<(Ticket, Authenticator), HandshakeError> {
        let (server, server_key) = kerberos_key(identity)?;
        let ticket = Ticket::open(ticket, server_key)?;
        if &ticket.server != server {
            return Err(HandshakeError::Authentication(format!(
                "ticket is for {}, not {server}",
                ticket.server
            )));
        }
        if !ticket.is_valid_at(now) {
            return Err(HandshakeError::Authentication("ticket expired".to_string()));
        }

        let auth: Authenticator = open_record(&ticket.session_key, authenticator)?;
        if auth.client != ticket.client {
            return Err(HandshakeError::Authentication(
                "authenticator client does not match ticket".to_string(),
            ));
        }
        let skew = if auth.timestamp > now {
            auth.timestamp.duration_since(now)
        } else {
            now.duration_since(auth.timestamp)
        };
        if skew > self.config.max_clock_skew {
            return Err(HandshakeError::Authentication(format!(
                "clock skew {skew:?} exceeds {:?}",
                self.config.max_clock_skew
            )));
        }
        if !self.config.offers(auth.mechanism) {
            return Err(HandshakeError::Protocol(format!(
                "mechanism {} not offered",
                auth.mechanism
            )));
        }
        if !self.replay.lock().check(authenticator, now) {
            return Err(HandshakeError::Authentication(
                "replayed authenticator".to_string(),
            ));
        }
        Ok((ticket, auth))
    }

    async fn handshake_server(
        &self,
        mut stream: TcpStream,
        peer_addr: SocketAddr,
        identity: &NegotiatedIdentity,
    ) -> Result<Connection, NegotiationError> {
        let now = self.selector.now();
        let (ticket_bytes, authenticator_bytes) = match recv_message(&mut stream).await? {
            KrbMessage::ApReq {
                ticket,
                authenticator,
            } => (ticket, authenticator),
            _ => return Err(HandshakeError::Protocol("expected AP-REQ".to_string()).into()),
        };

        let (ticket, auth) =
            match self.verify_request(identity, &ticket_bytes, &authenticator_bytes, now) {
                Ok(verified) => verified,
                Err(e) => {
                    warn!(%peer_addr, error = %e, "rejecting kerberos client");
                    let reason = e.to_string();
                    let _ = send_message(&mut stream, &KrbMessage::Error { reason }).await;
                    return Err(e.into());
                }
            };

        let delegation = auth.delegation && ticket.forwardable;
        let reply = seal_record(
            &ticket.session_key,
            &ApReply {
                timestamp: auth.timestamp,
                delegation,
            },
        )?;
        send_message(&mut stream, &KrbMessage::ApRep { reply }).await?;

        let properties = SessionProperties {
            client: Some(ticket.client.clone()),
            server: Some(ticket.server.clone()),
            confidentiality: auth.mechanism.confidential(),
            integrity: true,
            delegation,
        };
        let session_expires_at = now
            .saturating_add(self.config.max_server_session_duration)
            .min(ticket.expires_at);
        debug!(
            %peer_addr,
            client = %ticket.client,
            mechanism = %auth.mechanism,
            "kerberos session accepted"
        );

        Ok(Connection {
            channel: Box::new(KerberosChannel::new(
                stream,
                Zeroizing::new(ticket.session_key),
                auth.mechanism,
                Role::Server,
            )),
            properties,
            satisfied: ConstraintSet::empty(),
            local: identity.clone(),
            peer: Some(ticket.client.clone()),
            peer_addr,
            established_at: now,
            session_expires_at,
        })
    }
}

#[async_trait]
impl SecurityProvider for KerberosProvider {
    fn tag(&self) -> ProviderTag {
        ProviderTag::KERBEROS
    }

    fn principal_type(&self) -> PrincipalType {
        PrincipalType::Kerberos
    }

    fn supported_kinds(&self) -> BTreeSet<ConstraintKind> {
        support::supported_kinds()
    }

    fn supports(&self, constraint: &Constraint, context: &ConstraintSet) -> bool {
        support::supports(&self.config, constraint, context)
    }

    fn max_session_duration(&self, _role: Role) -> Duration {
        self.config.max_server_session_duration
    }

    fn handshake_timeout(&self) -> Duration {
        self.config.handshake_timeout
    }

    fn dgc_supported(&self) -> bool {
        false
    }

    fn client_identity(
        &self,
        endpoint: &Endpoint,
        constraints: &ConstraintSet,
    ) -> Result<NegotiatedIdentity, NegotiationError> {
        let criteria = SelectionCriteria::for_client(
            constraints,
            PrincipalType::Kerberos,
            AuthNeed::Required,
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
        let server = expected_server_principal(endpoint, constraints).ok_or_else(|| {
            NegotiationError::unsupported_reason("kerberos endpoints need a server principal")
        })?;
        if server.kind() != PrincipalType::Kerberos {
            return Err(NegotiationError::unsupported_reason(format!(
                "{server} is not a kerberos principal"
            )));
        }
        let now = self.selector.now();
        let budget = constraints
            .connect_deadline(now, self.config.handshake_timeout)
            .remaining_from(now);
        debug!(%endpoint, local = %identity, %server, ?budget, "starting kerberos handshake");
        with_deadline(
            budget,
            self.handshake_client(endpoint, constraints, identity, server),
        )
        .await
    }

    fn server_identity(
        &self,
        endpoint: &ListenEndpoint,
    ) -> Result<NegotiatedIdentity, NegotiationError> {
        let mut criteria =
            SelectionCriteria::new(PrincipalType::Kerberos, AuthAction::Listen, AuthNeed::Required);
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
        with_deadline(
            self.config.handshake_timeout,
            self.handshake_server(stream, peer_addr, identity),
        )
        .await
    }
}

fn kerberos_key(identity: &NegotiatedIdentity) -> Result<(&Principal, &[u8; 32]), HandshakeError> {
    match identity.credential() {
        Some(entry) => match &entry.material {
            CredentialMaterial::Kerberos { key } => Ok((&entry.principal, &**key)),
            CredentialMaterial::X509 { .. } => Err(HandshakeError::Credential(
                "not a kerberos credential".to_string(),
            )),
        },
        None => Err(HandshakeError::Credential(
            "kerberos requires an authenticated identity".to_string(),
        )),
    }
}
