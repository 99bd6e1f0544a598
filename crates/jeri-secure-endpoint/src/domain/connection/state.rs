use std::fmt;
use std::time::Duration;

use crate::domain::endpoint::{Endpoint, ProviderTag};
use crate::domain::principal::Principal;
use crate::domain::time::Timestamp;

/// Pool-unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Reuse key: the endpoint value (which carries the provider tag) and the
/// local principal, `None` for anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    endpoint: Endpoint,
    local: Option<Principal>,
}

impl PoolKey {
    pub fn new(endpoint: Endpoint, local: Option<Principal>) -> Self {
        Self { endpoint, local }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn provider(&self) -> &ProviderTag {
        self.endpoint.provider()
    }

    pub fn local(&self) -> Option<&Principal> {
        self.local.as_ref()
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.local {
            Some(p) => write!(f, "{} as {p}", self.endpoint),
            None => write!(f, "{} as anonymous", self.endpoint),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Established,
    Expiring,
    Closed,
}

/// Why a connection left `Established`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetireReason {
    SessionBound,
    CredentialExpired,
    IdleTimeout,
    IoFailure,
    Shutdown,
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SessionBound => "session bound reached",
            Self::CredentialExpired => "credential expired",
            Self::IdleTimeout => "idle timeout",
            Self::IoFailure => "i/o failure",
            Self::Shutdown => "shutdown",
        })
    }
}

/// Lifecycle state and timing of one pooled connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub created_at: Timestamp,
    pub session_expires_at: Timestamp,
    pub credential_expires_at: Option<Timestamp>,
    pub last_used: Timestamp,
    pub in_flight: usize,
    pub retired_for: Option<RetireReason>,
}

impl ConnectionRecord {
    /// A record in `Connecting`, bounded to `session_bound` from `now`.
    pub fn connecting(
        id: ConnectionId,
        now: Timestamp,
        session_bound: Duration,
        credential_expires_at: Option<Timestamp>,
    ) -> Self {
        Self {
            id,
            state: ConnectionState::Connecting,
            created_at: now,
            session_expires_at: now.saturating_add(session_bound),
            credential_expires_at,
            last_used: now,
            in_flight: 0,
            retired_for: None,
        }
    }

    /// `Connecting -> Established`. Returns false from any other state.
    pub fn mark_established(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Established;
        true
    }

    /// Retirement trigger due at `now`, if any.
    pub fn retirement_due(&self, now: Timestamp) -> Option<RetireReason> {
        if now >= self.session_expires_at {
            return Some(RetireReason::SessionBound);
        }
        match self.credential_expires_at {
            Some(expiry) if now > expiry => Some(RetireReason::CredentialExpired),
            _ => None,
        }
    }

    /// Take one request if the connection is usable at `now`.
    ///
    /// An `Established` connection past a retirement trigger is moved to
    /// `Expiring` instead of being used.
    pub fn begin_request(&mut self, now: Timestamp) -> bool {
        if self.state != ConnectionState::Established {
            return false;
        }
        if let Some(reason) = self.retirement_due(now) {
            self.retire(reason);
            return false;
        }
        self.in_flight += 1;
        self.last_used = now;
        true
    }

    /// Finish one request. Closes a drained `Expiring` connection.
    pub fn end_request(&mut self, now: Timestamp) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.last_used = now;
        self.drain();
    }

    /// `Established -> Expiring`, then `Closed` if nothing is in flight.
    pub fn retire(&mut self, reason: RetireReason) {
        if self.state == ConnectionState::Established {
            self.state = ConnectionState::Expiring;
            self.retired_for = Some(reason);
        }
        self.drain();
    }

    /// Close immediately, in-flight requests or not.
    pub fn close(&mut self, reason: RetireReason) {
        if self.state != ConnectionState::Closed {
            self.retired_for.get_or_insert(reason);
            self.state = ConnectionState::Closed;
        }
    }

    /// Apply time-based transitions. Returns the new state if it changed.
    pub fn evaluate(&mut self, now: Timestamp, idle_timeout: Duration) -> Option<ConnectionState> {
        let before = self.state;
        match self.state {
            ConnectionState::Established => {
                if let Some(reason) = self.retirement_due(now) {
                    self.retire(reason);
                } else if self.in_flight == 0 && now.duration_since(self.last_used) >= idle_timeout
                {
                    self.close(RetireReason::IdleTimeout);
                }
            }
            ConnectionState::Expiring => self.drain(),
            ConnectionState::Connecting | ConnectionState::Closed => {}
        }
        (self.state != before).then_some(self.state)
    }

    pub fn is_closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    fn drain(&mut self) {
        if self.state == ConnectionState::Expiring && self.in_flight == 0 {
            self.state = ConnectionState::Closed;
        }
    }
}
