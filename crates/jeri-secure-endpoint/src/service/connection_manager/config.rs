use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

/// Connection pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionManagerConfig {
    /// Established connections unused this long are closed.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    /// Period of the background reaper.
    #[serde(with = "humantime_serde")]
    pub reap_interval: Duration,
    /// Outer bound on one negotiation, whatever the constraints allow.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15),
            reap_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(60),
        }
    }
}

impl ConnectionManagerConfig {
    #[cfg(test)]
    pub fn for_testing() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15),
            reap_interval: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reap_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "reap interval must be positive".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "connect timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
