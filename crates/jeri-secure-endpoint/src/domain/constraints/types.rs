use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::domain::errors::NegotiationError;
use crate::domain::principal::{Principal, PrincipalType};
use crate::domain::time::Timestamp;

/// Catalog of constraint kinds. Anything outside this catalog is unsupported by
/// every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintKind {
    ClientAuthentication,
    ServerAuthentication,
    Confidentiality,
    Integrity,
    Delegation,
    ClientMinPrincipal,
    ClientMaxPrincipal,
    ClientMinPrincipalType,
    ServerMinPrincipal,
    ConnectionAbsoluteTime,
    ConnectionRelativeTime,
    Alternatives,
}

impl ConstraintKind {
    /// Every kind in the catalog.
    pub const ALL: [ConstraintKind; 12] = [
        Self::ClientAuthentication,
        Self::ServerAuthentication,
        Self::Confidentiality,
        Self::Integrity,
        Self::Delegation,
        Self::ClientMinPrincipal,
        Self::ClientMaxPrincipal,
        Self::ClientMinPrincipalType,
        Self::ServerMinPrincipal,
        Self::ConnectionAbsoluteTime,
        Self::ConnectionRelativeTime,
        Self::Alternatives,
    ];
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A single constraint value. Immutable; equality, ordering and hashing are
/// structural.
///
/// Principal sets are non-empty. Build them with the checked constructors
/// ([`Constraint::client_min_principal`] and friends).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constraint {
    ClientAuthentication(bool),
    ServerAuthentication(bool),
    Confidentiality(bool),
    Integrity(bool),
    /// Conditional on client authentication. Trivially holds for an anonymous client.
    Delegation(bool),
    /// The client must authenticate as all of these.
    ClientMinPrincipal(BTreeSet<Principal>),
    /// The client may authenticate only as some of these.
    ClientMaxPrincipal(BTreeSet<Principal>),
    /// The client must authenticate as a principal of each of these types.
    ClientMinPrincipalType(BTreeSet<PrincipalType>),
    /// The server must authenticate as all of these.
    ServerMinPrincipal(BTreeSet<Principal>),
    /// Connection must be established before this instant.
    ConnectionAbsoluteTime(Timestamp),
    /// Connection must be established within this long of the call.
    ConnectionRelativeTime(Duration),
    /// At least one element must hold. Never nested, never a single element.
    Alternatives(Vec<Constraint>),
}

impl Constraint {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::ClientAuthentication(_) => ConstraintKind::ClientAuthentication,
            Self::ServerAuthentication(_) => ConstraintKind::ServerAuthentication,
            Self::Confidentiality(_) => ConstraintKind::Confidentiality,
            Self::Integrity(_) => ConstraintKind::Integrity,
            Self::Delegation(_) => ConstraintKind::Delegation,
            Self::ClientMinPrincipal(_) => ConstraintKind::ClientMinPrincipal,
            Self::ClientMaxPrincipal(_) => ConstraintKind::ClientMaxPrincipal,
            Self::ClientMinPrincipalType(_) => ConstraintKind::ClientMinPrincipalType,
            Self::ServerMinPrincipal(_) => ConstraintKind::ServerMinPrincipal,
            Self::ConnectionAbsoluteTime(_) => ConstraintKind::ConnectionAbsoluteTime,
            Self::ConnectionRelativeTime(_) => ConstraintKind::ConnectionRelativeTime,
            Self::Alternatives(_) => ConstraintKind::Alternatives,
        }
    }

    pub fn client_min_principal(
        principals: impl IntoIterator<Item = Principal>,
    ) -> Result<Self, NegotiationError> {
        non_empty(principals, "client minimum principal").map(Self::ClientMinPrincipal)
    }

    pub fn client_max_principal(
        principals: impl IntoIterator<Item = Principal>,
    ) -> Result<Self, NegotiationError> {
        non_empty(principals, "client maximum principal").map(Self::ClientMaxPrincipal)
    }

    pub fn client_min_principal_type(
        types: impl IntoIterator<Item = PrincipalType>,
    ) -> Result<Self, NegotiationError> {
        non_empty(types, "client minimum principal type").map(Self::ClientMinPrincipalType)
    }

    pub fn server_min_principal(
        principals: impl IntoIterator<Item = Principal>,
    ) -> Result<Self, NegotiationError> {
        non_empty(principals, "server minimum principal").map(Self::ServerMinPrincipal)
    }

    /// Build an alternatives constraint.
    ///
    /// Nested alternatives are flattened, duplicates are removed keeping the
    /// first occurrence, and a single remaining element is returned as itself.
    pub fn alternatives(
        elements: impl IntoIterator<Item = Constraint>,
    ) -> Result<Self, NegotiationError> {
        let mut flat: Vec<Constraint> = Vec::new();
        for element in elements {
            match element {
                Self::Alternatives(inner) => {
                    for c in inner {
                        if !flat.contains(&c) {
                            flat.push(c);
                        }
                    }
                }
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        match flat.len() {
            0 => Err(NegotiationError::InvalidConstraint(
                "alternatives must contain at least one constraint".to_string(),
            )),
            1 => Ok(flat.remove(0)),
            _ => Ok(Self::Alternatives(flat)),
        }
    }

    /// The boolean value of the five yes/no kinds.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::ClientAuthentication(b)
            | Self::ServerAuthentication(b)
            | Self::Confidentiality(b)
            | Self::Integrity(b)
            | Self::Delegation(b) => Some(*b),
            _ => None,
        }
    }

    /// Elements to try in order: the alternatives, or the constraint itself.
    pub fn elements(&self) -> &[Constraint] {
        match self {
            Self::Alternatives(elements) => elements,
            other => std::slice::from_ref(other),
        }
    }

    /// Whether both constraints can never hold at once.
    ///
    /// Covers opposite yes/no values of one kind and a client minimum principal
    /// outside an explicit client maximum. `Delegation(yes)` is conditional on
    /// client authentication and never conflicts with `ClientAuthentication(no)`.
    pub fn conflicts_with(&self, other: &Constraint) -> bool {
        match (self, other) {
            (Self::ClientMinPrincipal(min), Self::ClientMaxPrincipal(max))
            | (Self::ClientMaxPrincipal(max), Self::ClientMinPrincipal(min)) => {
                !min.is_subset(max)
            }
            _ => match (self.as_bool(), other.as_bool()) {
                (Some(a), Some(b)) => self.kind() == other.kind() && a != b,
                _ => false,
            },
        }
    }
}

fn non_empty<T: Ord>(
    items: impl IntoIterator<Item = T>,
    what: &str,
) -> Result<BTreeSet<T>, NegotiationError> {
    let set: BTreeSet<T> = items.into_iter().collect();
    if set.is_empty() {
        return Err(NegotiationError::InvalidConstraint(format!(
            "{what} set must not be empty"
        )));
    }
    Ok(set)
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

fn write_set<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    items: impl IntoIterator<Item = T>,
) -> fmt::Result {
    write!(f, "{name}{{")?;
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("}")
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientAuthentication(b)
            | Self::ServerAuthentication(b)
            | Self::Confidentiality(b)
            | Self::Integrity(b)
            | Self::Delegation(b) => write!(f, "{}({})", self.kind(), yes_no(*b)),
            Self::ClientMinPrincipal(s) => write_set(f, "ClientMinPrincipal", s),
            Self::ClientMaxPrincipal(s) => write_set(f, "ClientMaxPrincipal", s),
            Self::ClientMinPrincipalType(s) => write_set(f, "ClientMinPrincipalType", s),
            Self::ServerMinPrincipal(s) => write_set(f, "ServerMinPrincipal", s),
            Self::ConnectionAbsoluteTime(t) => write!(f, "ConnectionAbsoluteTime({t})"),
            Self::ConnectionRelativeTime(d) => write!(f, "ConnectionRelativeTime({d:?})"),
            Self::Alternatives(elements) => write_set(f, "Alternatives", elements),
        }
    }
}
