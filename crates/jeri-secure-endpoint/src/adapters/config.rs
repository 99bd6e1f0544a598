//! File and environment configuration.
//!
//! ```toml
//! [tls]
//! max_server_session_duration = "24h"
//! protocol = "TLSv1.3"
//! cipher_suites = ["TLS13_AES_256_GCM_SHA384"]
//!
//! [kerberos]
//! mechanisms = ["chacha20-poly1305"]
//! max_clock_skew = "2m"
//!
//! [connection_manager]
//! idle_timeout = "30s"
//!
//! [discovery]
//! timeout = "10s"
//!
//! [logging]
//! level = "jeri_secure_endpoint=debug"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::telemetry::LoggingConfig;
use crate::discovery::DiscoveryConfig;
use crate::domain::ConfigError;
use crate::providers::kerberos::KerberosProviderConfig;
use crate::providers::tls::TlsProviderConfig;
use crate::service::ConnectionManagerConfig;

pub const ENV_SSL_MAX_SERVER_SESSION_DURATION: &str = "JERI_SSL_MAX_SERVER_SESSION_DURATION";
pub const ENV_SSL_PROTOCOL: &str = "JERI_SSL_PROTOCOL";
pub const ENV_SSL_TRUST_ALGORITHM: &str = "JERI_SSL_TRUST_ALGORITHM";
pub const ENV_SSL_CIPHER_SUITES: &str = "JERI_SSL_CIPHER_SUITES";
pub const ENV_DISCOVERY_TIMEOUT: &str = "JERI_DISCOVERY_TIMEOUT";

/// Every configurable section. Missing sections take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub tls: TlsProviderConfig,
    pub kerberos: KerberosProviderConfig,
    pub connection_manager: ConnectionManagerConfig,
    pub discovery: DiscoveryConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Read `path`, apply environment overrides and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            message: e.to_string(),
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML without consulting the environment.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(ENV_SSL_MAX_SERVER_SESSION_DURATION) {
            self.tls.max_server_session_duration =
                parse_duration(ENV_SSL_MAX_SERVER_SESSION_DURATION, &value)?;
        }
        if let Some(value) = lookup(ENV_SSL_PROTOCOL) {
            self.tls.protocol = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_SSL_TRUST_ALGORITHM) {
            self.tls.trust_algorithm = value.trim().to_string();
        }
        if let Some(value) = lookup(ENV_SSL_CIPHER_SUITES) {
            self.tls.cipher_suites = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = lookup(ENV_DISCOVERY_TIMEOUT) {
            self.discovery.timeout = parse_duration(ENV_DISCOVERY_TIMEOUT, &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tls.validate()?;
        self.kerberos.validate()?;
        self.connection_manager.validate()?;
        self.discovery.validate()
    }
}

/// A humantime duration (`90s`, `1h 30m`), or a bare number of milliseconds.
fn parse_duration(name: &str, value: &str) -> Result<Duration, ConfigError> {
    let value = value.trim();
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|e| ConfigError::Env {
                name: name.to_string(),
                message: e.to_string(),
            });
    }
    humantime::parse_duration(value).map_err(|e| ConfigError::Env {
        name: name.to_string(),
        message: e.to_string(),
    })
}
