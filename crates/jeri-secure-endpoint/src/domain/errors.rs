//! # Negotiation Errors
//!
//! Every failure is reported synchronously to the call that triggered
//! negotiation. Nothing here is retried transparently. Errors are `Clone` so a
//! single negotiation outcome can be handed to every caller waiting on it.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use super::constraints::Constraint;
use super::credentials::AuthAction;
use super::principal::Principal;

/// Errors surfaced by constraint combination, credential selection, handshakes,
/// the connection pool and discovery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// Two requirements cannot both hold.
    #[error("conflicting constraints: {first} and {second}")]
    Conflict {
        first: Constraint,
        second: Constraint,
    },

    /// A constraint value is malformed (empty principal set, empty alternatives).
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    /// A requirement cannot be met by the provider, the credentials or the peer.
    #[error("unsupported constraint: {reason}")]
    UnsupportedConstraint {
        /// The offending requirement, when a single one is to blame.
        constraint: Option<Constraint>,
        reason: String,
    },

    /// The provider handshake failed. The connection has been torn down.
    #[error("handshake failed: {0}")]
    HandshakeFailure(#[from] HandshakeError),

    /// Local policy forbids using a credential for this action.
    #[error("permission denied: {principal} may not {action} (peer: {peer})")]
    PermissionDenied {
        principal: Principal,
        peer: String,
        action: AuthAction,
    },

    /// Every resolved address of a lookup locator failed.
    #[error("discovery failed: {0}")]
    DiscoveryFailure(DiscoveryFailure),

    /// An established channel failed mid-request. The connection has been torn down.
    #[error("channel failed: {0}")]
    ChannelFailure(String),

    /// The manager or listener is shutting down.
    #[error("shutting down")]
    Shutdown,
}

impl NegotiationError {
    /// Unsupported because of one specific constraint.
    pub fn unsupported(constraint: &Constraint, reason: impl fmt::Display) -> Self {
        Self::UnsupportedConstraint {
            constraint: Some(constraint.clone()),
            reason: format!("{constraint}: {reason}"),
        }
    }

    /// Unsupported for a reason not tied to a single constraint.
    pub fn unsupported_reason(reason: impl Into<String>) -> Self {
        Self::UnsupportedConstraint {
            constraint: None,
            reason: reason.into(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedConstraint { .. })
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}

/// Failures during socket connect and the provider handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Socket level failure.
    #[error("i/o error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    /// Connect plus handshake exceeded the deadline.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Malformed or unexpected handshake message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer could not be authenticated.
    #[error("peer authentication failed: {0}")]
    Authentication(String),

    /// Local key material is unusable (bad key, expired ticket).
    #[error("credential unusable: {0}")]
    Credential(String),
}

impl From<io::Error> for HandshakeError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<io::Error> for NegotiationError {
    fn from(err: io::Error) -> Self {
        Self::HandshakeFailure(err.into())
    }
}

/// Error class of a single unicast discovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiscoveryErrorClass {
    /// The received registrar could not be resolved to a known capability set.
    ClassResolution,
    /// Socket or stream format failure.
    Io,
    /// Local policy refused the connection.
    Security,
}

/// Aggregated outcome of a discovery that exhausted every resolved address.
///
/// Holds the last error of each observed class. The displayed error is the one
/// with the highest priority: class resolution, then I/O, then security.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryFailure {
    pub locator: String,
    pub attempts: usize,
    pub class_resolution: Option<String>,
    pub io: Option<String>,
    pub security: Option<String>,
}

impl DiscoveryFailure {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            ..Self::default()
        }
    }

    /// Record one failed attempt, replacing the previous error of the same class.
    pub fn record(&mut self, class: DiscoveryErrorClass, message: impl Into<String>) {
        self.attempts += 1;
        let slot = match class {
            DiscoveryErrorClass::ClassResolution => &mut self.class_resolution,
            DiscoveryErrorClass::Io => &mut self.io,
            DiscoveryErrorClass::Security => &mut self.security,
        };
        *slot = Some(message.into());
    }

    /// Highest priority class observed.
    pub fn primary(&self) -> Option<(DiscoveryErrorClass, &str)> {
        self.class_resolution
            .as_deref()
            .map(|m| (DiscoveryErrorClass::ClassResolution, m))
            .or_else(|| self.io.as_deref().map(|m| (DiscoveryErrorClass::Io, m)))
            .or_else(|| {
                self.security
                    .as_deref()
                    .map(|m| (DiscoveryErrorClass::Security, m))
            })
    }
}

impl fmt::Display for DiscoveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primary() {
            Some((DiscoveryErrorClass::ClassResolution, msg)) => {
                write!(f, "{}: class resolution failed: {msg}", self.locator)
            }
            Some((DiscoveryErrorClass::Io, msg)) => write!(f, "{}: i/o error: {msg}", self.locator),
            Some((DiscoveryErrorClass::Security, msg)) => {
                write!(f, "{}: connection not permitted: {msg}", self.locator)
            }
            None => write!(f, "{}: no addresses to try", self.locator),
        }
    }
}

/// Rejections of `jini://host[:port]/` locators. Raised before any socket is opened.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    /// Not a URL at all.
    #[error("malformed locator: {0}")]
    Malformed(String),

    /// Scheme other than `jini`.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    /// `jini:` without `//`.
    #[error("opaque locator not allowed")]
    Opaque,

    /// Empty host.
    #[error("missing host")]
    MissingHost,

    /// Host contains characters a host name cannot have.
    #[error("invalid host: {0}")]
    InvalidHost(String),

    /// `user@host` form.
    #[error("user info not allowed")]
    UserInfo,

    /// `?query` present.
    #[error("query not allowed")]
    Query,

    /// `#fragment` present.
    #[error("fragment not allowed")]
    Fragment,

    /// Path other than empty or `/`.
    #[error("path not allowed: {0}")]
    Path(String),

    /// Port is not a decimal number.
    #[error("invalid port: {0}")]
    InvalidPort(String),

    /// Port outside 1..=65535.
    #[error("port out of range: {0}")]
    PortOutOfRange(u64),
}

/// Configuration loading and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    /// File is not valid TOML for the expected schema.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// Environment variable has an unusable value.
    #[error("invalid value for {name}: {message}")]
    Env { name: String, message: String },

    /// A value is out of its allowed range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
