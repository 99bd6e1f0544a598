use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

/// Per-message protection applied to an established session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mechanism {
    /// Encrypted and authenticated (confidentiality and integrity).
    #[serde(rename = "chacha20-poly1305")]
    Sealed,
    /// Authenticated only (integrity without confidentiality).
    #[serde(rename = "hmac-sha256")]
    IntegrityOnly,
}

impl Mechanism {
    pub fn name(&self) -> &'static str {
        match self {
            Mechanism::Sealed => "chacha20-poly1305",
            Mechanism::IntegrityOnly => "hmac-sha256",
        }
    }

    pub fn confidential(&self) -> bool {
        matches!(self, Mechanism::Sealed)
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kerberos-style provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KerberosProviderConfig {
    /// Session lifetime bound; a session also ends when its ticket expires.
    #[serde(with = "humantime_serde")]
    pub max_server_session_duration: Duration,
    /// Mechanisms offered, earlier preferred.
    pub mechanisms: Vec<Mechanism>,
    /// Largest accepted difference between authenticator time and local time.
    #[serde(with = "humantime_serde")]
    pub max_clock_skew: Duration,
    /// Lifetime requested for service tickets.
    #[serde(with = "humantime_serde")]
    pub ticket_lifetime: Duration,
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

impl Default for KerberosProviderConfig {
    fn default() -> Self {
        Self {
            max_server_session_duration: Duration::from_secs(24 * 60 * 60),
            mechanisms: vec![Mechanism::Sealed, Mechanism::IntegrityOnly],
            max_clock_skew: Duration::from_secs(5 * 60),
            ticket_lifetime: Duration::from_secs(10 * 60 * 60),
            handshake_timeout: Duration::from_secs(60),
        }
    }
}

impl KerberosProviderConfig {
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mechanisms.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one mechanism is required".to_string(),
            ));
        }
        if self.max_server_session_duration.is_zero()
            || self.ticket_lifetime.is_zero()
            || self.handshake_timeout.is_zero()
        {
            return Err(ConfigError::Invalid(
                "kerberos durations must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn offers(&self, mechanism: Mechanism) -> bool {
        self.mechanisms.contains(&mechanism)
    }
}
