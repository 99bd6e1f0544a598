//! Test utilities for secure endpoint negotiation.
//!
//! Deterministic stand-ins for the clock and for a security provider.
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use jeri_secure_endpoint::test_utils::ControlledTimeSource;
//! use jeri_secure_endpoint::TimeSource;
//!
//! let time = ControlledTimeSource::new(1_000);
//! time.advance(Duration::from_secs(2));
//! assert_eq!(time.now().as_millis(), 3_000);
//! ```

use std::collections::BTreeSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use zeroize::Zeroizing;

use crate::domain::{
    Constraint, ConstraintKind, ConstraintSet, CredentialEntry, CredentialMaterial, Endpoint,
    HandshakeError, ListenEndpoint, NegotiatedIdentity, NegotiationError, Principal,
    PrincipalType, ProviderTag, Role, SessionProperties, Timestamp, ValidityWindow,
};
use crate::ports::TimeSource;
use crate::providers::{
    read_frame, satisfied_subset, write_frame, ChannelError, Connection, FramedChannel,
    SecureChannel, SecurityProvider,
};

// ============================================================================
// ControlledTimeSource
// ============================================================================

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ControlledTimeSource {
    millis: Arc<AtomicU64>,
}

impl ControlledTimeSource {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(millis)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_millis(), Ordering::SeqCst);
    }
}

impl TimeSource for ControlledTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

// ============================================================================
// CountingProvider
// ============================================================================

/// In-memory provider that counts handshakes.
///
/// Each connect creates a duplex pipe whose far end echoes every frame.
/// Sessions are authenticated as `server` toward an optional `client`
/// principal, with confidentiality and integrity.
pub struct CountingProvider {
    tag: ProviderTag,
    client: Option<Principal>,
    server: Principal,
    time: Arc<dyn TimeSource>,
    session_duration: Duration,
    handshake_delay: Duration,
    dead_peer: bool,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    fail_next: AtomicBool,
}

impl CountingProvider {
    pub fn new(tag: ProviderTag, time: Arc<dyn TimeSource>) -> Self {
        Self {
            tag,
            client: None,
            server: Principal::x500("CN=counting-server"),
            time,
            session_duration: Duration::from_secs(3600),
            handshake_delay: Duration::ZERO,
            dead_peer: false,
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Authenticate the client as `principal`.
    pub fn with_client(mut self, principal: Principal) -> Self {
        self.client = Some(principal);
        self
    }

    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    /// Sleep this long inside every handshake.
    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    /// The far end hangs up right after the handshake.
    pub fn with_dead_peer(mut self) -> Self {
        self.dead_peer = true;
        self
    }

    /// Handshakes started so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Channels closed by their owner so far.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Make the next handshake fail with a protocol error.
    pub fn fail_next_connect(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn properties(&self) -> SessionProperties {
        SessionProperties {
            client: self.client.clone(),
            server: Some(self.server.clone()),
            confidentiality: true,
            integrity: true,
            delegation: false,
        }
    }
}

/// Echo channel that counts explicit closes.
struct CountedChannel {
    inner: FramedChannel<tokio::io::DuplexStream>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl SecureChannel for CountedChannel {
    async fn send(&mut self, message: &[u8]) -> Result<(), ChannelError> {
        self.inner.send(message).await
    }

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        self.inner.recv().await
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.inner.close().await
    }
}

#[async_trait]
impl SecurityProvider for CountingProvider {
    fn tag(&self) -> ProviderTag {
        self.tag.clone()
    }

    fn principal_type(&self) -> PrincipalType {
        PrincipalType::X500
    }

    fn supported_kinds(&self) -> BTreeSet<ConstraintKind> {
        ConstraintKind::ALL.into_iter().collect()
    }

    fn supports(&self, constraint: &Constraint, context: &ConstraintSet) -> bool {
        crate::domain::ConstraintSupport::supports(&self.properties(), constraint, context)
    }

    fn max_session_duration(&self, _role: Role) -> Duration {
        self.session_duration
    }

    fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn client_identity(
        &self,
        _endpoint: &Endpoint,
        _constraints: &ConstraintSet,
    ) -> Result<NegotiatedIdentity, NegotiationError> {
        Ok(match &self.client {
            Some(principal) => NegotiatedIdentity::Authenticated(CredentialEntry::new(
                principal.clone(),
                CredentialMaterial::Kerberos {
                    key: Zeroizing::new([0u8; 32]),
                },
                ValidityWindow::unbounded(),
            )),
            None => NegotiatedIdentity::Anonymous,
        })
    }

    async fn connect(
        &self,
        _endpoint: &Endpoint,
        constraints: &ConstraintSet,
        identity: &NegotiatedIdentity,
    ) -> Result<Connection, NegotiationError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.handshake_delay.is_zero() {
            tokio::time::sleep(self.handshake_delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(HandshakeError::Protocol("injected failure".to_string()).into());
        }

        let properties = self.properties();
        let satisfied = satisfied_subset(&properties, constraints)?;
        let (near, mut far) = tokio::io::duplex(64 * 1024);
        if self.dead_peer {
            drop(far);
        } else {
            tokio::spawn(async move {
                while let Ok(Some(frame)) = read_frame(&mut far).await {
                    if write_frame(&mut far, &frame).await.is_err() {
                        break;
                    }
                }
            });
        }

        let now = self.time.now();
        Ok(Connection {
            channel: Box::new(CountedChannel {
                inner: FramedChannel::new(near),
                closes: Arc::clone(&self.closes),
            }),
            peer: properties.server.clone(),
            properties,
            satisfied,
            local: identity.clone(),
            peer_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            established_at: now,
            session_expires_at: now.saturating_add(self.session_duration),
        })
    }

    fn server_identity(
        &self,
        _endpoint: &ListenEndpoint,
    ) -> Result<NegotiatedIdentity, NegotiationError> {
        Ok(NegotiatedIdentity::Anonymous)
    }

    async fn accept(
        &self,
        _stream: TcpStream,
        _peer_addr: SocketAddr,
        _identity: &NegotiatedIdentity,
    ) -> Result<Connection, NegotiationError> {
        Err(HandshakeError::Protocol("counting provider does not accept".to_string()).into())
    }
}
