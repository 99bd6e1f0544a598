use std::collections::HashSet;

use parking_lot::RwLock;

use crate::domain::{AuthAction, Principal};
use crate::ports::PermissionCheck;

/// One grant: `local` may perform `action`, toward `peer` or toward anyone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grant {
    pub local: Principal,
    pub action: AuthAction,
    /// `None` grants the action toward any peer, including anonymous ones.
    pub peer: Option<Principal>,
}

/// Table-driven permission check. Nothing is permitted unless granted.
#[derive(Debug, Default)]
pub struct PolicyPermissionCheck {
    grants: RwLock<HashSet<Grant>>,
}

impl PolicyPermissionCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `local` every action toward every peer.
    pub fn allow_all_for(self, local: Principal) -> Self {
        for action in [AuthAction::Connect, AuthAction::Accept, AuthAction::Listen] {
            self.grant(Grant {
                local: local.clone(),
                action,
                peer: None,
            });
        }
        self
    }

    pub fn grant(&self, grant: Grant) {
        self.grants.write().insert(grant);
    }

    pub fn revoke(&self, grant: &Grant) -> bool {
        self.grants.write().remove(grant)
    }
}

impl PermissionCheck for PolicyPermissionCheck {
    fn permits(&self, local: &Principal, peer: Option<&Principal>, action: AuthAction) -> bool {
        let grants = self.grants.read();
        grants.iter().any(|g| {
            &g.local == local
                && g.action == action
                && match &g.peer {
                    None => true,
                    Some(p) => Some(p) == peer,
                }
        })
    }
}

/// Permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionCheck for AllowAll {
    fn permits(&self, _local: &Principal, _peer: Option<&Principal>, _action: AuthAction) -> bool {
        true
    }
}
