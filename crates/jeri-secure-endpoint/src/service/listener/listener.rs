use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::{
    AuthAction, ConstraintSet, HandshakeError, ListenEndpoint, NegotiationError, Principal,
    SessionProperties, Timestamp,
};
use crate::ports::RequestDispatcher;
use crate::providers::{Connection, SecurityProvider};
use crate::service::CredentialSelector;

/// What the dispatcher learns about a validated inbound session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundContext {
    /// Principal this side authenticated as, `None` when anonymous.
    pub local: Option<Principal>,
    /// Authenticated client, `None` for an anonymous client.
    pub peer: Option<Principal>,
    pub properties: SessionProperties,
    pub satisfied: ConstraintSet,
    pub peer_addr: SocketAddr,
    /// The listener closes the session at this instant.
    pub session_expires_at: Timestamp,
}

/// Stops a running [`Listener`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl ListenerHandle {
    /// Close the listening socket and every open session.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Bound listen endpoint.
pub struct Listener {
    socket: TcpListener,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
}

/// State every inbound session task needs. Never owns the listening socket.
struct Shared {
    endpoint: ListenEndpoint,
    provider: Arc<dyn SecurityProvider>,
    selector: Arc<CredentialSelector>,
    dispatcher: Arc<dyn RequestDispatcher>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Listener {
    /// Bind `endpoint` for `provider`.
    ///
    /// Fails when the provider tag differs from the endpoint's, when no local
    /// credential can back the endpoint, or when the socket cannot be bound.
    pub async fn bind(
        endpoint: ListenEndpoint,
        provider: Arc<dyn SecurityProvider>,
        selector: Arc<CredentialSelector>,
        dispatcher: Arc<dyn RequestDispatcher>,
    ) -> Result<Self, NegotiationError> {
        if provider.tag() != *endpoint.provider() {
            return Err(NegotiationError::unsupported_reason(format!(
                "endpoint is for provider {}, not {}",
                endpoint.provider(),
                provider.tag()
            )));
        }
        let identity = provider.server_identity(&endpoint)?;

        let socket = TcpListener::bind((endpoint.host(), endpoint.port()))
            .await
            .map_err(HandshakeError::from)?;
        let local_addr = socket.local_addr().map_err(HandshakeError::from)?;
        let (shutdown, _) = watch::channel(false);

        info!(%endpoint, %local_addr, local = %identity, "listener bound");
        Ok(Self {
            socket,
            local_addr,
            shared: Arc::new(Shared {
                endpoint,
                provider,
                selector,
                dispatcher,
                shutdown: Arc::new(shutdown),
            }),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn endpoint(&self) -> &ListenEndpoint {
        &self.shared.endpoint
    }

    pub fn handle(&self) -> ListenerHandle {
        ListenerHandle {
            shutdown: Arc::clone(&self.shared.shutdown),
        }
    }

    /// Accept connections until the handle fires. The listening socket is
    /// closed on return.
    pub async fn serve(self) -> Result<(), NegotiationError> {
        let mut stop = self.shared.shutdown.subscribe();
        let mut backoff = AcceptBackoff::default();
        let endpoint = &self.shared.endpoint;
        info!(%endpoint, addr = %self.local_addr, "listener started");

        loop {
            if *stop.borrow_and_update() {
                break;
            }
            tokio::select! {
                accepted = self.socket.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        backoff.reset();
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(async move { shared.handle_session(stream, peer_addr).await });
                    }
                    Err(e) => {
                        let delay = backoff.on_error();
                        warn!(%endpoint, error = %e, ?delay, "accept failed");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = stop.changed() => {}
                        }
                    }
                },
                _ = stop.changed() => {}
            }
        }

        info!(%endpoint, "listener stopped");
        Ok(())
    }
}

impl Shared {
    async fn handle_session(&self, stream: TcpStream, peer_addr: SocketAddr) {
        let connection = tokio::select! {
            established = self.establish(stream, peer_addr) => match established {
                Ok(connection) => connection,
                Err(e) => {
                    warn!(endpoint = %self.endpoint, %peer_addr, error = %e, "inbound session refused");
                    return;
                }
            },
            _ = stopped(self.shutdown.subscribe()) => return,
        };

        let context = InboundContext {
            local: connection.local.principal().cloned(),
            peer: connection.peer.clone(),
            properties: connection.properties,
            satisfied: connection.satisfied,
            peer_addr,
            session_expires_at: connection.session_expires_at,
        };
        let remaining = connection
            .session_expires_at
            .remaining_from(self.selector.now());
        debug!(%peer_addr, peer = ?context.peer, ?remaining, "dispatching inbound session");

        tokio::select! {
            _ = self.dispatcher.dispatch(context, connection.channel) => {
                debug!(%peer_addr, "inbound session finished");
            }
            _ = tokio::time::sleep(remaining) => {
                info!(%peer_addr, "server session bound reached, closing");
            }
            _ = stopped(self.shutdown.subscribe()) => {
                debug!(%peer_addr, "closing inbound session on shutdown");
            }
        }
    }

    /// Reselect the local credential, run the handshake and check the
    /// accept permission.
    async fn establish(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<Connection, NegotiationError> {
        let identity = self.provider.server_identity(&self.endpoint)?;
        if !self.selector.is_still_valid(&identity) {
            return Err(HandshakeError::Credential(format!(
                "local credential for {identity} is no longer valid"
            ))
            .into());
        }

        let connection = self.provider.accept(stream, peer_addr, &identity).await?;

        if let Some(local) = connection.local.principal() {
            if !self
                .selector
                .permits(local, connection.peer.as_ref(), AuthAction::Accept)
            {
                return Err(NegotiationError::PermissionDenied {
                    principal: local.clone(),
                    peer: connection
                        .peer
                        .as_ref()
                        .map_or_else(|| "anonymous".to_string(), ToString::to_string),
                    action: AuthAction::Accept,
                });
            }
        }
        Ok(connection)
    }
}

/// Delay before accepting again after consecutive accept failures, such as
/// running out of file descriptors.
#[derive(Debug, Default)]
pub(super) struct AcceptBackoff {
    failures: u32,
}

impl AcceptBackoff {
    const INITIAL: Duration = Duration::from_millis(5);
    const MAX: Duration = Duration::from_secs(1);

    /// Record a failure and return how long to wait.
    pub(super) fn on_error(&mut self) -> Duration {
        let delay = Self::INITIAL
            .saturating_mul(1 << self.failures.min(16))
            .min(Self::MAX);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    pub(super) fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Resolves once the shutdown flag is set.
async fn stopped(mut stop: watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("endpoint", &self.shared.endpoint)
            .field("local_addr", &self.local_addr)
            .finish_non_exhaustive()
    }
}
