use std::collections::BTreeSet;

use super::types::{AuthAction, AuthNeed, CredentialEntry, NegotiatedIdentity};
use crate::domain::constraints::{Constraint, ConstraintKind, ConstraintSet};
use crate::domain::errors::NegotiationError;
use crate::domain::principal::{Principal, PrincipalType};
use crate::domain::time::Timestamp;

/// What a local identity must look like for one connect, listen or accept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SelectionCriteria {
    pub kind: PrincipalType,
    pub action: AuthAction,
    pub need: AuthNeed,
    /// Exact principals the local side must authenticate as.
    pub required: BTreeSet<Principal>,
    /// Upper bound on the principals that may be used, if any.
    pub allowed: Option<BTreeSet<Principal>>,
    /// Principals to try first, in order.
    pub preferred: Vec<Principal>,
    /// The remote party, when known. Passed to the permission check.
    pub peer: Option<Principal>,
}

impl SelectionCriteria {
    pub fn new(kind: PrincipalType, action: AuthAction, need: AuthNeed) -> Self {
        Self {
            kind,
            action,
            need,
            required: BTreeSet::new(),
            allowed: None,
            preferred: Vec::new(),
            peer: None,
        }
    }

    pub fn with_required(mut self, principal: Principal) -> Self {
        self.required.insert(principal);
        self
    }

    pub fn with_peer(mut self, peer: Option<Principal>) -> Self {
        self.peer = peer;
        self
    }

    /// Client-side criteria from an already reduced constraint set.
    ///
    /// `ClientMinPrincipal` requirements become exact principals,
    /// `ClientMaxPrincipal` requirements intersect into the allowed bound, and
    /// `ClientMinPrincipal` preferences become the preferred order.
    pub fn for_client(
        constraints: &ConstraintSet,
        kind: PrincipalType,
        need: AuthNeed,
        peer: Option<Principal>,
    ) -> Self {
        let mut criteria = Self::new(kind, AuthAction::Connect, need).with_peer(peer);

        for constraint in constraints.requirements() {
            match constraint {
                Constraint::ClientMinPrincipal(set) => {
                    criteria.required.extend(set.iter().cloned());
                }
                Constraint::ClientMaxPrincipal(set) => {
                    criteria.allowed = Some(match criteria.allowed.take() {
                        Some(current) => current.intersection(set).cloned().collect(),
                        None => set.clone(),
                    });
                }
                _ => {}
            }
        }

        for constraint in constraints.preferences_of(ConstraintKind::ClientMinPrincipal) {
            if let Constraint::ClientMinPrincipal(set) = constraint {
                for principal in set {
                    if !criteria.preferred.contains(principal) {
                        criteria.preferred.push(principal.clone());
                    }
                }
            }
        }

        criteria
    }

    fn admits(&self, principal: &Principal) -> bool {
        principal.kind() == self.kind
            && self
                .allowed
                .as_ref()
                .map_or(true, |allowed| allowed.contains(principal))
    }
}

/// Pick the local identity for `criteria` among `entries`.
///
/// `permits` is the caller's permission check `(local, peer, action)`. `sticky`
/// is a previous choice for the same criteria; it wins while it is still a
/// valid, permitted candidate.
pub fn select_identity(
    criteria: &SelectionCriteria,
    entries: &[CredentialEntry],
    now: Timestamp,
    permits: &dyn Fn(&Principal, Option<&Principal>, AuthAction) -> bool,
    sticky: Option<&Principal>,
) -> Result<NegotiatedIdentity, NegotiationError> {
    if criteria.need == AuthNeed::Forbidden {
        return Ok(NegotiatedIdentity::Anonymous);
    }

    if !criteria.required.is_empty() {
        return select_exact(criteria, entries, now, permits);
    }

    let mut candidates: Vec<&CredentialEntry> = entries
        .iter()
        .filter(|entry| criteria.admits(&entry.principal) && entry.is_valid_at(now))
        .collect();
    candidates.sort_by(|a, b| a.principal.name().cmp(b.principal.name()));

    let usable = |entry: &CredentialEntry| {
        permits(&entry.principal, criteria.peer.as_ref(), criteria.action)
    };
    let find = |principal: &Principal| {
        candidates
            .iter()
            .copied()
            .find(|e| &e.principal == principal)
            .filter(|e| usable(e))
    };

    let chosen = sticky
        .and_then(|s| find(s))
        .or_else(|| criteria.preferred.iter().find_map(|p| find(p)))
        .or_else(|| candidates.iter().copied().find(|e| usable(e)));

    match (chosen, criteria.need) {
        (Some(entry), _) => Ok(NegotiatedIdentity::Authenticated(entry.clone())),
        (None, AuthNeed::Required) => Err(NegotiationError::unsupported_reason(
            "no usable principal",
        )),
        (None, _) => Ok(NegotiatedIdentity::Anonymous),
    }
}

fn select_exact(
    criteria: &SelectionCriteria,
    entries: &[CredentialEntry],
    now: Timestamp,
    permits: &dyn Fn(&Principal, Option<&Principal>, AuthAction) -> bool,
) -> Result<NegotiatedIdentity, NegotiationError> {
    let mut required = criteria.required.iter();
    let principal = match (required.next(), required.next()) {
        (Some(p), None) => p,
        _ => {
            return Err(NegotiationError::unsupported_reason(format!(
                "cannot authenticate as {} principals at once",
                criteria.required.len()
            )))
        }
    };

    if !criteria.admits(principal) {
        return Err(NegotiationError::unsupported_reason(format!(
            "principal {principal} is not usable here"
        )));
    }

    let mut matching = entries.iter().filter(|e| &e.principal == principal).peekable();
    if matching.peek().is_none() {
        return Err(NegotiationError::unsupported_reason(format!(
            "no credential for {principal}"
        )));
    }
    let entry = matching.find(|e| e.is_valid_at(now)).ok_or_else(|| {
        NegotiationError::unsupported_reason(format!("credential for {principal} is not valid"))
    })?;

    if !permits(principal, criteria.peer.as_ref(), criteria.action) {
        return Err(NegotiationError::PermissionDenied {
            principal: principal.clone(),
            peer: criteria
                .peer
                .as_ref()
                .map_or_else(|| "any".to_string(), ToString::to_string),
            action: criteria.action,
        });
    }

    Ok(NegotiatedIdentity::Authenticated(entry.clone()))
}
