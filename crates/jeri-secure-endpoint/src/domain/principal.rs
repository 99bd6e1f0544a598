//! # Principals
//!
//! Named identities a provider can authenticate a party as. A principal is a
//! type tag plus a name; equality and ordering are structural.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of identity a principal names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrincipalType {
    /// X.500 distinguished name taken from a certificate subject.
    X500,
    /// Kerberos principal name (`name@REALM`).
    Kerberos,
}

impl PrincipalType {
    /// Stable tag used in logs and configuration.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::X500 => "x509-distinguished-name",
            Self::Kerberos => "kerberos",
        }
    }
}

impl fmt::Display for PrincipalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An identity value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Principal {
    kind: PrincipalType,
    name: String,
}

impl Principal {
    pub fn new(kind: PrincipalType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// An X.500 principal, e.g. `CN=alice, O=Example`.
    pub fn x500(name: impl Into<String>) -> Self {
        Self::new(PrincipalType::X500, name)
    }

    /// A Kerberos principal, e.g. `alice@EXAMPLE.ORG`.
    pub fn kerberos(name: impl Into<String>) -> Self {
        Self::new(PrincipalType::Kerberos, name)
    }

    pub fn kind(&self) -> PrincipalType {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}
