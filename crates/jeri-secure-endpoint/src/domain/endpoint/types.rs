use std::borrow::Cow;
use std::fmt;

use crate::domain::principal::Principal;

/// Identifies a security provider. Adding a provider means picking a new tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderTag(Cow<'static, str>);

impl ProviderTag {
    /// TLS-style provider.
    pub const TLS: ProviderTag = ProviderTag(Cow::Borrowed("ssl"));
    /// Kerberos-style provider.
    pub const KERBEROS: ProviderTag = ProviderTag(Cow::Borrowed("kerberos"));

    pub fn new(tag: impl Into<String>) -> Self {
        Self(Cow::Owned(tag.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the socket factory used to open connections. Only compared,
/// never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketFactoryId(String);

impl SocketFactoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Client-side target: host, port, provider and optional server principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
    provider: ProviderTag,
    server_principal: Option<Principal>,
    socket_factory: Option<SocketFactoryId>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, provider: ProviderTag) -> Self {
        Self {
            host: host.into(),
            port,
            provider,
            server_principal: None,
            socket_factory: None,
        }
    }

    /// Principal the server is expected to authenticate as.
    pub fn with_server_principal(mut self, principal: Principal) -> Self {
        self.server_principal = Some(principal);
        self
    }

    pub fn with_socket_factory(mut self, factory: SocketFactoryId) -> Self {
        self.socket_factory = Some(factory);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn provider(&self) -> &ProviderTag {
        &self.provider
    }

    pub fn server_principal(&self) -> Option<&Principal> {
        self.server_principal.as_ref()
    }

    pub fn socket_factory(&self) -> Option<&SocketFactoryId> {
        self.socket_factory.as_ref()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.provider)?;
        write_host_port(f, &self.host, self.port)?;
        if let Some(principal) = &self.server_principal {
            write!(f, " [{principal}]")?;
        }
        Ok(())
    }
}

/// Server-side listen address. Port 0 binds an ephemeral port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenEndpoint {
    host: String,
    port: u16,
    provider: ProviderTag,
    server_principal: Option<Principal>,
    socket_factory: Option<SocketFactoryId>,
}

impl ListenEndpoint {
    pub fn new(host: impl Into<String>, port: u16, provider: ProviderTag) -> Self {
        Self {
            host: host.into(),
            port,
            provider,
            server_principal: None,
            socket_factory: None,
        }
    }

    /// Listen only as this principal instead of selecting one.
    pub fn with_server_principal(mut self, principal: Principal) -> Self {
        self.server_principal = Some(principal);
        self
    }

    pub fn with_socket_factory(mut self, factory: SocketFactoryId) -> Self {
        self.socket_factory = Some(factory);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn provider(&self) -> &ProviderTag {
        &self.provider
    }

    pub fn server_principal(&self) -> Option<&Principal> {
        self.server_principal.as_ref()
    }

    pub fn socket_factory(&self) -> Option<&SocketFactoryId> {
        self.socket_factory.as_ref()
    }

    /// Client endpoint reaching this listener on `port` (the bound port).
    pub fn client_endpoint(&self, host: impl Into<String>, port: u16) -> Endpoint {
        let mut endpoint = Endpoint::new(host, port, self.provider.clone());
        endpoint.server_principal = self.server_principal.clone();
        endpoint.socket_factory = self.socket_factory.clone();
        endpoint
    }
}

impl fmt::Display for ListenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.provider)?;
        write_host_port(f, &self.host, self.port)
    }
}

/// `host:port`, bracketing IPv6 literals.
pub(super) fn write_host_port(f: &mut fmt::Formatter<'_>, host: &str, port: u16) -> fmt::Result {
    if host.contains(':') {
        write!(f, "[{host}]:{port}")
    } else {
        write!(f, "{host}:{port}")
    }
}
