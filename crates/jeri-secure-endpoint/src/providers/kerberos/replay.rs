use std::collections::HashMap;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::domain::Timestamp;

/// Authenticator replay cache.
///
/// Remembers a digest of every authenticator accepted within the clock skew
/// window. An authenticator older than the window is already rejected by the
/// skew check, so entries past it are dropped.
#[derive(Debug, Clone)]
pub struct ReplayCache {
    seen: HashMap<[u8; 32], Timestamp>,
    window: Duration,
}

impl ReplayCache {
    pub fn new(window: Duration) -> Self {
        Self {
            seen: HashMap::new(),
            window,
        }
    }

    /// Record `authenticator`. Returns `false` if it was seen before.
    pub fn check(&mut self, authenticator: &[u8], now: Timestamp) -> bool {
        let horizon = now.saturating_sub(self.window * 2);
        self.seen.retain(|_, seen_at| *seen_at >= horizon);

        let digest: [u8; 32] = Sha256::digest(authenticator).into();
        if self.seen.contains_key(&digest) {
            return false;
        }
        self.seen.insert(digest, now);
        true
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(5 * 60))
    }
}
