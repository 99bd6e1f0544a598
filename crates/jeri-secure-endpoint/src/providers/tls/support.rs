use std::collections::BTreeSet;

use crate::domain::{AuthNeed, Constraint, ConstraintKind, ConstraintSet, PrincipalType};

pub(super) fn supported_kinds() -> BTreeSet<ConstraintKind> {
    ConstraintKind::ALL.into_iter().collect()
}

pub(super) fn supports(constraint: &Constraint, context: &ConstraintSet) -> bool {
    let x500 = |set: &BTreeSet<crate::domain::Principal>| {
        set.iter().all(|p| p.kind() == PrincipalType::X500)
    };
    match constraint {
        Constraint::Integrity(b) | Constraint::Confidentiality(b) => *b,
        Constraint::ServerAuthentication(b) => *b,
        // A delegating client has to stay anonymous here.
        Constraint::ClientAuthentication(true) => !context.requires(&Constraint::Delegation(true)),
        Constraint::ClientAuthentication(false) => true,
        Constraint::Delegation(false) => true,
        Constraint::Delegation(true) => {
            !context.requires(&Constraint::ClientAuthentication(true))
        }
        Constraint::ClientMinPrincipal(set) => set.len() == 1 && x500(set),
        Constraint::ClientMaxPrincipal(set) => set.iter().any(|p| p.kind() == PrincipalType::X500),
        Constraint::ClientMinPrincipalType(types) => {
            types.iter().all(|t| *t == PrincipalType::X500)
        }
        Constraint::ServerMinPrincipal(set) => set.len() == 1 && x500(set),
        Constraint::ConnectionAbsoluteTime(_) | Constraint::ConnectionRelativeTime(_) => true,
        Constraint::Alternatives(_) => false,
    }
}

/// Whether the client must, may or must not present a certificate.
pub(super) fn client_auth_need(constraints: &ConstraintSet) -> AuthNeed {
    if constraints.requires(&Constraint::ClientAuthentication(true)) {
        AuthNeed::Required
    } else if constraints.requires(&Constraint::ClientAuthentication(false))
        || constraints.requires(&Constraint::Delegation(true))
        || constraints.prefers(&Constraint::ClientAuthentication(false))
    {
        AuthNeed::Forbidden
    } else {
        AuthNeed::Optional
    }
}
