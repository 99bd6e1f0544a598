use std::collections::BTreeSet;

use super::config::{KerberosProviderConfig, Mechanism};
use crate::domain::{Constraint, ConstraintKind, ConstraintSet, Principal, PrincipalType};

pub(super) fn supported_kinds() -> BTreeSet<ConstraintKind> {
    ConstraintKind::ALL.into_iter().collect()
}

fn single_kerberos(set: &BTreeSet<Principal>) -> bool {
    set.len() == 1 && set.iter().all(|p| p.kind() == PrincipalType::Kerberos)
}

pub(super) fn supports(
    config: &KerberosProviderConfig,
    constraint: &Constraint,
    _context: &ConstraintSet,
) -> bool {
    match constraint {
        Constraint::ClientAuthentication(b)
        | Constraint::ServerAuthentication(b)
        | Constraint::Integrity(b) => *b,
        Constraint::Confidentiality(true) => config.offers(Mechanism::Sealed),
        Constraint::Confidentiality(false) => config.offers(Mechanism::IntegrityOnly),
        Constraint::Delegation(_) => true,
        Constraint::ClientMinPrincipal(set) | Constraint::ServerMinPrincipal(set) => {
            single_kerberos(set)
        }
        Constraint::ClientMaxPrincipal(set) => {
            set.iter().any(|p| p.kind() == PrincipalType::Kerberos)
        }
        Constraint::ClientMinPrincipalType(types) => {
            types.iter().all(|t| *t == PrincipalType::Kerberos)
        }
        Constraint::ConnectionAbsoluteTime(_) | Constraint::ConnectionRelativeTime(_) => true,
        Constraint::Alternatives(_) => false,
    }
}

/// Mechanism for a session under reduced `constraints`.
pub(super) fn choose_mechanism(
    config: &KerberosProviderConfig,
    constraints: &ConstraintSet,
) -> Mechanism {
    let wanted = |confidential: bool| {
        if confidential {
            Mechanism::Sealed
        } else {
            Mechanism::IntegrityOnly
        }
    };
    for confidential in [true, false] {
        if constraints.requires(&Constraint::Confidentiality(confidential)) {
            return wanted(confidential);
        }
    }
    constraints
        .preferences_of(ConstraintKind::Confidentiality)
        .filter_map(Constraint::as_bool)
        .map(wanted)
        .find(|m| config.offers(*m))
        .or_else(|| config.mechanisms.first().copied())
        .unwrap_or(Mechanism::Sealed)
}

/// Whether the client asks to delegate its credentials.
pub(super) fn wants_delegation(constraints: &ConstraintSet) -> bool {
    constraints.requires(&Constraint::Delegation(true))
        || constraints.prefers(&Constraint::Delegation(true))
}
