use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::config::DiscoveryConfig;
use super::registrar::{RegistrarDecodeError, RegistrarProxy};
use super::wire::{read_response, write_request, WireError};
use super::DiscoveryError;
use crate::domain::{DiscoveryErrorClass, DiscoveryFailure, LookupLocator, NegotiationError};
use crate::ports::{ConnectPolicy, HostResolver, RegistrarDecoder, SocketConnector};

/// Outcome of a successful unicast handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicastDiscoveryResult {
    pub locator: LookupLocator,
    /// Address that answered.
    pub addr: SocketAddr,
    pub registrar: RegistrarProxy,
    pub groups: Vec<String>,
}

/// Unicast discovery client.
pub struct UnicastDiscovery {
    config: DiscoveryConfig,
    resolver: Arc<dyn HostResolver>,
    connector: Arc<dyn SocketConnector>,
    policy: Arc<dyn ConnectPolicy>,
    decoder: Arc<dyn RegistrarDecoder>,
}

impl UnicastDiscovery {
    pub fn new(
        config: DiscoveryConfig,
        resolver: Arc<dyn HostResolver>,
        connector: Arc<dyn SocketConnector>,
        policy: Arc<dyn ConnectPolicy>,
        decoder: Arc<dyn RegistrarDecoder>,
    ) -> Self {
        Self {
            config,
            resolver,
            connector,
            policy,
            decoder,
        }
    }

    /// Parse `url` and discover. A malformed URL fails before any socket is opened.
    pub async fn discover_url(
        &self,
        url: &str,
    ) -> Result<UnicastDiscoveryResult, DiscoveryError> {
        let locator = LookupLocator::parse(url)?;
        Ok(self.discover(&locator).await?)
    }

    /// Try each resolved address in order; the first successful handshake wins.
    ///
    /// When all fail, the error carries the last failure of each class and is
    /// displayed by priority: class resolution, then I/O, then security.
    pub async fn discover(
        &self,
        locator: &LookupLocator,
    ) -> Result<UnicastDiscoveryResult, NegotiationError> {
        let mut failure = DiscoveryFailure::new(locator.to_string());
        let addrs = match self.resolver.resolve(locator.host(), locator.port()).await {
            Ok(addrs) => addrs,
            Err(e) => {
                failure.record(DiscoveryErrorClass::Io, e.to_string());
                warn!(%locator, error = %e, "lookup host did not resolve");
                return Err(NegotiationError::DiscoveryFailure(failure));
            }
        };

        for addr in addrs {
            if !self.policy.may_connect(&addr) {
                debug!(%locator, %addr, "connection refused by local policy");
                failure.record(DiscoveryErrorClass::Security, format!("{addr} not permitted"));
                continue;
            }
            let attempt = tokio::time::timeout(self.config.timeout, self.attempt(addr)).await;
            match attempt {
                Ok(Ok((registrar, groups))) => {
                    info!(%locator, %addr, groups = groups.len(), "discovered lookup service");
                    return Ok(UnicastDiscoveryResult {
                        locator: locator.clone(),
                        addr,
                        registrar,
                        groups,
                    });
                }
                Ok(Err((class, message))) => {
                    debug!(%locator, %addr, ?class, %message, "discovery attempt failed");
                    failure.record(class, format!("{addr}: {message}"));
                }
                Err(_) => {
                    debug!(%locator, %addr, "discovery attempt timed out");
                    failure.record(
                        DiscoveryErrorClass::Io,
                        format!("{addr}: timed out after {:?}", self.config.timeout),
                    );
                }
            }
        }

        warn!(%locator, attempts = failure.attempts, "unicast discovery failed");
        Err(NegotiationError::DiscoveryFailure(failure))
    }

    async fn attempt(
        &self,
        addr: SocketAddr,
    ) -> Result<(RegistrarProxy, Vec<String>), (DiscoveryErrorClass, String)> {
        let io = |e: WireError| (DiscoveryErrorClass::Io, e.to_string());

        let mut stream = self
            .connector
            .connect(addr, None)
            .await
            .map_err(|e| (DiscoveryErrorClass::Io, e.to_string()))?;
        if self.config.tcp_nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%addr, error = %e, "failed to set TCP_NODELAY");
            }
        }
        write_request(&mut stream).await.map_err(io)?;
        let response = read_response(&mut stream).await.map_err(io)?;

        let registrar = self.decoder.decode(&response.registrar).map_err(|e| match e {
            RegistrarDecodeError::ClassResolution(_) => {
                (DiscoveryErrorClass::ClassResolution, e.to_string())
            }
            RegistrarDecodeError::Format(_) => (DiscoveryErrorClass::Io, e.to_string()),
        })?;
        Ok((registrar, response.groups))
    }
}
