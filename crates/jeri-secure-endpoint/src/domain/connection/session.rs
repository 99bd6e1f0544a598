use crate::domain::constraints::{Constraint, ConstraintSet, ConstraintSupport};
use crate::domain::principal::Principal;

/// What an established session actually provides.
///
/// Used as a [`ConstraintSupport`] to decide whether a pooled connection can
/// carry a new request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProperties {
    /// Principal the client authenticated as, `None` for an anonymous client.
    pub client: Option<Principal>,
    /// Principal the server authenticated as, `None` for an anonymous server.
    pub server: Option<Principal>,
    pub confidentiality: bool,
    pub integrity: bool,
    /// The client delegated its credentials to the server.
    pub delegation: bool,
}

impl SessionProperties {
    /// Whether every requirement of `constraints` holds for this session.
    /// Preferences never disqualify a session.
    pub fn satisfies(&self, constraints: &ConstraintSet) -> bool {
        constraints
            .requirements()
            .all(|r| r.elements().iter().any(|e| self.supports(e, constraints)))
    }
}

impl ConstraintSupport for SessionProperties {
    fn supports(&self, constraint: &Constraint, context: &ConstraintSet) -> bool {
        match constraint {
            Constraint::ClientAuthentication(b) => *b == self.client.is_some(),
            Constraint::ServerAuthentication(b) => *b == self.server.is_some(),
            Constraint::Confidentiality(b) => *b == self.confidentiality,
            Constraint::Integrity(b) => *b == self.integrity,
            // Principal and delegation constraints only bind authenticated parties.
            Constraint::Delegation(b) => self.client.is_none() || *b == self.delegation,
            Constraint::ClientMinPrincipal(set) => match &self.client {
                None => true,
                Some(p) => set.iter().all(|q| q == p),
            },
            Constraint::ClientMaxPrincipal(set) => {
                self.client.as_ref().map_or(true, |p| set.contains(p))
            }
            Constraint::ClientMinPrincipalType(types) => match &self.client {
                None => true,
                Some(p) => types.iter().all(|t| *t == p.kind()),
            },
            Constraint::ServerMinPrincipal(set) => match &self.server {
                None => true,
                Some(p) => set.iter().all(|q| q == p),
            },
            Constraint::ConnectionAbsoluteTime(_) | Constraint::ConnectionRelativeTime(_) => true,
            Constraint::Alternatives(elements) => {
                elements.iter().any(|e| self.supports(e, context))
            }
        }
    }

    fn describe(&self) -> String {
        "established session".to_string()
    }
}
