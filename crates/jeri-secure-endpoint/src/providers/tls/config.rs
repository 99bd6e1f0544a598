use std::time::Duration;

use rustls::crypto::{ring, CryptoProvider};
use rustls::SupportedProtocolVersion;
use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

/// TLS-style provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsProviderConfig {
    /// Lifetime of a server-side session before the client must renegotiate.
    #[serde(with = "humantime_serde")]
    pub max_server_session_duration: Duration,
    /// Lifetime of a client-side session. Kept below the server bound so
    /// clients retire first.
    #[serde(with = "humantime_serde")]
    pub max_client_session_duration: Duration,
    /// `TLS` (any supported version), `TLSv1.3` or `TLSv1.2`.
    pub protocol: String,
    /// Trust verification algorithm. Only `PKIX` is available.
    pub trust_algorithm: String,
    /// Allowed cipher suites, earlier preferred. Empty, or naming no known
    /// suite, means the default list.
    pub cipher_suites: Vec<String>,
    /// Default bound on connect plus handshake.
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
}

impl Default for TlsProviderConfig {
    fn default() -> Self {
        Self {
            max_server_session_duration: Duration::from_secs(24 * 60 * 60),
            max_client_session_duration: Duration::from_secs(23 * 60 * 60 + 30 * 60),
            protocol: "TLS".to_string(),
            trust_algorithm: "PKIX".to_string(),
            cipher_suites: Vec::new(),
            handshake_timeout: Duration::from_secs(60),
        }
    }
}

impl TlsProviderConfig {
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_server_session_duration.is_zero() || self.max_client_session_duration.is_zero()
        {
            return Err(ConfigError::Invalid(
                "session durations must be positive".to_string(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "handshake timeout must be positive".to_string(),
            ));
        }
        if !self.trust_algorithm.eq_ignore_ascii_case("PKIX") {
            return Err(ConfigError::Invalid(format!(
                "unsupported trust algorithm: {}",
                self.trust_algorithm
            )));
        }
        self.protocol_versions().map(|_| ())
    }

    pub fn protocol_versions(&self) -> Result<Vec<&'static SupportedProtocolVersion>, ConfigError> {
        match self.protocol.to_ascii_uppercase().as_str() {
            "TLS" => Ok(rustls::ALL_VERSIONS.to_vec()),
            "TLSV1.3" => Ok(vec![&rustls::version::TLS13]),
            "TLSV1.2" => Ok(vec![&rustls::version::TLS12]),
            _ => Err(ConfigError::Invalid(format!(
                "unsupported protocol: {}",
                self.protocol
            ))),
        }
    }

    /// Crypto provider restricted to the configured suites, in preference order.
    pub fn crypto_provider(&self) -> CryptoProvider {
        let mut provider = ring::default_provider();
        let selected: Vec<_> = self
            .cipher_suites
            .iter()
            .filter_map(|wanted| {
                ring::ALL_CIPHER_SUITES
                    .iter()
                    .find(|suite| format!("{:?}", suite.suite()).eq_ignore_ascii_case(wanted))
                    .copied()
            })
            .collect();
        if !selected.is_empty() {
            provider.cipher_suites = selected;
        }
        provider
    }
}
