use std::fmt;

use zeroize::Zeroizing;

use crate::domain::principal::Principal;
use crate::domain::time::Timestamp;

/// Which side of a connection an identity is chosen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

/// Action a credential is about to be used for, as seen by the permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthAction {
    /// Authenticate as a client to a server.
    Connect,
    /// Authenticate as a server to an inbound client.
    Accept,
    /// Bind a listen endpoint under this identity.
    Listen,
}

impl fmt::Display for AuthAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Accept => "accept",
            Self::Listen => "listen",
        })
    }
}

/// Whether the local side must, may or must not authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthNeed {
    Required,
    /// Authenticate when a usable credential exists, anonymous otherwise.
    Optional,
    Forbidden,
}

/// Interval during which a credential may be used. Both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidityWindow {
    pub not_before: Timestamp,
    pub not_after: Timestamp,
}

impl ValidityWindow {
    pub fn new(not_before: Timestamp, not_after: Timestamp) -> Self {
        Self {
            not_before,
            not_after,
        }
    }

    /// Valid from the epoch until the end of time.
    pub fn unbounded() -> Self {
        Self::new(Timestamp::from_millis(0), Timestamp::MAX)
    }

    pub fn contains(&self, now: Timestamp) -> bool {
        self.not_before <= now && now <= self.not_after
    }
}

/// Key material backing a principal.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialMaterial {
    /// DER certificate chain (leaf first) and PKCS#8 DER private key.
    X509 {
        chain: Vec<Vec<u8>>,
        private_key: Zeroizing<Vec<u8>>,
    },
    /// Long-term key shared with the key distribution center.
    Kerberos { key: Zeroizing<[u8; 32]> },
}

impl fmt::Debug for CredentialMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X509 { chain, .. } => f
                .debug_struct("X509")
                .field("chain_len", &chain.len())
                .field("private_key", &"<redacted>")
                .finish(),
            Self::Kerberos { .. } => f
                .debug_struct("Kerberos")
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}

/// One principal with its key material and validity window.
///
/// Owned by the credential store. Never mutated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub principal: Principal,
    pub material: CredentialMaterial,
    pub validity: ValidityWindow,
}

impl CredentialEntry {
    pub fn new(principal: Principal, material: CredentialMaterial, validity: ValidityWindow) -> Self {
        Self {
            principal,
            material,
            validity,
        }
    }

    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.validity.contains(now)
    }
}

/// Outcome of selection: a local principal with its credential, or anonymous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiatedIdentity {
    Anonymous,
    Authenticated(CredentialEntry),
}

impl NegotiatedIdentity {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(entry) => Some(&entry.principal),
        }
    }

    pub fn credential(&self) -> Option<&CredentialEntry> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(entry) => Some(entry),
        }
    }

    /// When the backing credential stops being valid. `None` when anonymous.
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.credential().map(|entry| entry.validity.not_after)
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Display for NegotiatedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("anonymous"),
            Self::Authenticated(entry) => write!(f, "{}", entry.principal),
        }
    }
}
