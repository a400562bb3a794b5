//! Centralized Configuration
//!
//! Configuration structures consumed by the runtime. Hosts typically load these
//! from a layered source (the CLI uses figment) and pass the result to the
//! runtime builder.

use core::time::Duration;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{CompanionError, CompanionResult};
use crate::retry::{
    RetryBackoff, DEFAULT_RETRY_CEILING_SECS, DEFAULT_RETRY_FLOOR_SECS, DEFAULT_RETRY_MULTIPLIER,
};

// ----------------------------------------------------------------------------
// Authentication Configuration
// ----------------------------------------------------------------------------

/// Retry policy for transient authentication failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Interval carried by every independent attempt, in seconds
    pub retry_floor_secs: u64,
    /// Upper bound for the retry delay, in seconds
    pub retry_ceiling_secs: u64,
    /// Growth factor applied after each retryable failure
    pub retry_multiplier: f64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            retry_floor_secs: DEFAULT_RETRY_FLOOR_SECS,
            retry_ceiling_secs: DEFAULT_RETRY_CEILING_SECS,
            retry_multiplier: DEFAULT_RETRY_MULTIPLIER,
        }
    }
}

impl AuthConfig {
    pub fn backoff(&self) -> CompanionResult<RetryBackoff> {
        RetryBackoff::new(
            Duration::from_secs(self.retry_floor_secs),
            Duration::from_secs(self.retry_ceiling_secs),
            self.retry_multiplier,
        )
    }
}

// ----------------------------------------------------------------------------
// Remote Client Configuration
// ----------------------------------------------------------------------------

/// Identity the companion presents to the remote service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Application client identifier issued by the remote service
    pub client_id: String,
    /// Application name reported to the remote service
    pub app_name: String,
    /// Application version reported to the remote service
    pub version: String,
    /// Total connection attempts per request
    pub max_retry_attempts: u32,
    /// Read timeout per request in seconds, zero disables read retries
    pub read_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: "c9ccd3684988a7862a8542ae0000535e0fbd2d1c0ca35583af7ea4e784650a61"
                .to_string(),
            app_name: "companion".to_string(),
            version: crate::VERSION.to_string(),
            max_retry_attempts: 3,
            read_timeout_secs: 0,
        }
    }
}

impl ClientConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

// ----------------------------------------------------------------------------
// Runtime Configuration
// ----------------------------------------------------------------------------

/// Process-level behavior of the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Lock file used by the singleton guard, none disables the guard
    pub lock_file: Option<PathBuf>,
    /// Delay between answering a validation request and restarting, in milliseconds
    pub restart_grace_ms: u64,
    /// Environment variable carrying the host's own API access token
    pub host_token_env: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lock_file: None,
            restart_grace_ms: 3000,
            host_token_env: "PLEXTOKEN".to_string(),
        }
    }
}

impl RuntimeConfig {
    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }
}

// ----------------------------------------------------------------------------
// Combined Configuration
// ----------------------------------------------------------------------------

/// Everything the runtime builder needs besides its collaborators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub auth: AuthConfig,
    pub client: ClientConfig,
    pub runtime: RuntimeConfig,
}

impl CompanionConfig {
    /// Short delays for test suites
    pub fn testing() -> Self {
        Self {
            runtime: RuntimeConfig {
                restart_grace_ms: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn validate(&self) -> CompanionResult<()> {
        self.auth.backoff()?;

        if self.client.client_id.trim().is_empty() {
            return Err(CompanionError::invalid_config(
                "client.client_id",
                "must not be empty",
            ));
        }

        if self.client.max_retry_attempts == 0 {
            return Err(CompanionError::invalid_config(
                "client.max_retry_attempts",
                "must be at least 1",
            ));
        }

        if self.runtime.restart_grace_ms == 0 {
            return Err(CompanionError::invalid_config(
                "runtime.restart_grace_ms",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CompanionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.client.max_retry_attempts, 3);
        assert_eq!(config.runtime.restart_grace(), Duration::from_secs(3));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = CompanionConfig::default();
        config.auth.retry_ceiling_secs = 10;
        assert!(config.validate().is_err());

        let mut config = CompanionConfig::default();
        config.client.client_id = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = CompanionConfig::testing();
        config.runtime.restart_grace_ms = 0;
        assert!(config.validate().is_err());
    }
}
