//! Name resolution and raw TCP connects on tokio.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::debug;

use crate::domain::SocketFactoryId;
use crate::ports::{HostResolver, SocketConnector};

// ============================================================================
// TokioHostResolver
// ============================================================================

/// Resolves through the system resolver, preserving its address order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioHostResolver;

#[async_trait]
impl HostResolver for TokioHostResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let addrs: Vec<SocketAddr> = lookup_host((host, port)).await?.collect();
        debug!(host, port, resolved = addrs.len(), "resolved host");
        Ok(addrs)
    }
}

/// Resolver returning a fixed address list for every name.
#[derive(Debug, Clone, Default)]
pub struct StaticHostResolver {
    addrs: Vec<SocketAddr>,
}

impl StaticHostResolver {
    pub fn new(addrs: Vec<SocketAddr>) -> Self {
        Self { addrs }
    }
}

#[async_trait]
impl HostResolver for StaticHostResolver {
    async fn resolve(&self, _host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        Ok(self
            .addrs
            .iter()
            .map(|addr| {
                let mut addr = *addr;
                if addr.port() == 0 {
                    addr.set_port(port);
                }
                addr
            })
            .collect())
    }
}

// ============================================================================
// TcpSocketConnector
// ============================================================================

/// Plain TCP connects bounded by a per-attempt timeout.
///
/// Named socket factories are not distinguished; every factory id connects
/// directly.
#[derive(Debug, Clone, Copy)]
pub struct TcpSocketConnector {
    timeout: Duration,
    keepalive: bool,
}

impl TcpSocketConnector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            keepalive: true,
        }
    }

    /// Enable or disable `SO_KEEPALIVE` on new sockets.
    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }

    async fn open(&self, addr: SocketAddr) -> io::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(self.keepalive)?;
        socket.connect(addr).await
    }
}

impl Default for TcpSocketConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl SocketConnector for TcpSocketConnector {
    async fn connect(
        &self,
        addr: SocketAddr,
        factory: Option<&SocketFactoryId>,
    ) -> io::Result<TcpStream> {
        if let Some(factory) = factory {
            debug!(%addr, factory = factory.as_str(), "connecting through socket factory");
        }
        match tokio::time::timeout(self.timeout, self.open(addr)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {addr} timed out after {:?}", self.timeout),
            )),
        }
    }
}
