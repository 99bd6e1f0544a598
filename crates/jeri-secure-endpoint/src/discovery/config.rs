use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

/// Unicast discovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Bound on connect plus handshake, per address.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub tcp_nodelay: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }
}

impl DiscoveryConfig {
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "discovery timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
