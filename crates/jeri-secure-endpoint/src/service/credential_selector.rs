//! # Credential Selector
//!
//! Stateful wrapper around [`select_identity`]: reads the injected credential
//! store, consults the injected permission check and remembers each choice so
//! repeated selections under the same criteria return the same principal.
//!
//! Remembered choices are bounded; the least recently used is forgotten first.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::domain::{
    select_identity, AuthAction, NegotiatedIdentity, NegotiationError, Principal,
    SelectionCriteria, Timestamp,
};
use crate::ports::{CredentialStore, PermissionCheck, TimeSource};

/// Default bound on remembered choices.
pub const DEFAULT_STICKY_CAPACITY: usize = 1024;

struct StickyChoice {
    principal: Principal,
    last_used: u64,
}

#[derive(Default)]
struct StickyCache {
    choices: HashMap<SelectionCriteria, StickyChoice>,
    clock: u64,
}

pub struct CredentialSelector {
    store: Arc<dyn CredentialStore>,
    permission: Arc<dyn PermissionCheck>,
    time: Arc<dyn TimeSource>,
    sticky: Mutex<StickyCache>,
    capacity: usize,
}

impl CredentialSelector {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        permission: Arc<dyn PermissionCheck>,
        time: Arc<dyn TimeSource>,
    ) -> Self {
        Self {
            store,
            permission,
            time,
            sticky: Mutex::new(StickyCache::default()),
            capacity: DEFAULT_STICKY_CAPACITY,
        }
    }

    /// Remember at most `capacity` choices (at least one).
    pub fn with_sticky_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn now(&self) -> Timestamp {
        self.time.now()
    }

    pub fn time_source(&self) -> Arc<dyn TimeSource> {
        Arc::clone(&self.time)
    }

    pub fn permits(&self, local: &Principal, peer: Option<&Principal>, action: AuthAction) -> bool {
        self.permission.permits(local, peer, action)
    }

    /// Select the local identity for `criteria`.
    pub fn select(
        &self,
        criteria: &SelectionCriteria,
    ) -> Result<NegotiatedIdentity, NegotiationError> {
        let entries = self.store.entries(criteria.kind);
        let now = self.time.now();
        let previous = self
            .sticky
            .lock()
            .choices
            .get(criteria)
            .map(|choice| choice.principal.clone());
        let permits = |local: &Principal, peer: Option<&Principal>, action: AuthAction| {
            self.permission.permits(local, peer, action)
        };

        let result = select_identity(criteria, &entries, now, &permits, previous.as_ref());

        let mut sticky = self.sticky.lock();
        match &result {
            Ok(NegotiatedIdentity::Authenticated(entry)) => {
                if previous.as_ref() != Some(&entry.principal) {
                    debug!(
                        principal = %entry.principal,
                        action = %criteria.action,
                        "selected local principal"
                    );
                }
                sticky.remember(criteria, entry.principal.clone(), self.capacity);
            }
            Ok(NegotiatedIdentity::Anonymous) | Err(_) => {
                sticky.choices.remove(criteria);
            }
        }
        result
    }

    /// Whether `identity` is still backed by a valid entry in the store.
    pub fn is_still_valid(&self, identity: &NegotiatedIdentity) -> bool {
        let Some(current) = identity.credential() else {
            return true;
        };
        let now = self.time.now();
        self.store
            .entries(current.principal.kind())
            .iter()
            .any(|entry| entry == current && entry.is_valid_at(now))
    }
}

impl StickyCache {
    fn remember(&mut self, criteria: &SelectionCriteria, principal: Principal, capacity: usize) {
        self.clock += 1;
        let last_used = self.clock;
        if let Some(choice) = self.choices.get_mut(criteria) {
            choice.principal = principal;
            choice.last_used = last_used;
            return;
        }
        while self.choices.len() >= capacity {
            let Some(oldest) = self
                .choices
                .iter()
                .min_by_key(|(_, choice)| choice.last_used)
                .map(|(criteria, _)| criteria.clone())
            else {
                break;
            };
            self.choices.remove(&oldest);
        }
        self.choices.insert(
            criteria.clone(),
            StickyChoice {
                principal,
                last_used,
            },
        );
    }
}

impl std::fmt::Debug for CredentialSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSelector")
            .field("sticky", &self.sticky.lock().choices.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
