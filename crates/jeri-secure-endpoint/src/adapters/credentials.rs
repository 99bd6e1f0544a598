use parking_lot::RwLock;

use crate::domain::{CredentialEntry, PrincipalType};
use crate::ports::CredentialStore;

/// Credential store held in memory, in insertion order.
///
/// Entries can be added and removed while the store is shared, which is how
/// hosts rotate credentials.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    entries: RwLock<Vec<CredentialEntry>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = CredentialEntry>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
        }
    }

    pub fn insert(&self, entry: CredentialEntry) {
        self.entries.write().push(entry);
    }

    /// Remove every entry for `principal`. Returns how many were removed.
    pub fn remove(&self, principal: &crate::domain::Principal) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|e| &e.principal != principal);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn entries(&self, kind: PrincipalType) -> Vec<CredentialEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.principal.kind() == kind)
            .cloned()
            .collect()
    }
}
