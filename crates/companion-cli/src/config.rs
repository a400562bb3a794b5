//! Companion CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - Built-in defaults
//! - `companion.toml` in the working directory
//! - The file passed with `--config`
//! - Environment variables (`COMPANION_<SECTION>__<KEY>`)
//!
//! The loaded `AppConfig` is validated and then converted into the runtime's
//! `CompanionConfig` plus the initial `Preferences`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use companion_core::{
    ActivityMode, AuthConfig, ClientConfig, CompanionConfig, LogLevel, MatcherMode, Preferences,
    RuntimeConfig, VERSION,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::DEFAULT_REQUEST_TIMEOUT;
use crate::error::{CliError, Result};

/// File looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "companion.toml";

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "COMPANION_";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the companion CLI
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote service endpoint and identity
    pub client: ClientSettings,

    /// Authentication retry policy
    pub auth: AuthConfig,

    /// Process behavior
    pub runtime: RuntimeSettings,

    /// Initial user preferences
    pub preferences: PreferenceSettings,
}

/// Remote identity service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Application client identifier
    pub client_id: String,

    /// Application name reported to the service
    pub app_name: String,

    /// Base URL of the remote API
    pub api_url: String,

    /// Path of the login endpoint, relative to `api_url`
    pub login_path: String,

    /// Total connection attempts per request
    pub max_retry_attempts: u32,

    /// Per-request read timeout in seconds, zero disables timeout retries
    pub read_timeout_secs: u64,

    /// Bound on a request while `read_timeout_secs` is zero, in seconds
    pub request_timeout_secs: u64,
}

/// Process-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Directory holding the state store and lock file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,

    /// Whether to take the singleton lock file
    pub singleton: bool,

    /// Lock file name inside the state directory
    pub lock_file_name: String,

    /// Delay before a requested restart, in milliseconds
    pub restart_grace_ms: u64,

    /// Environment variable carrying the host access token
    pub host_token_env: String,
}

/// Preferences the companion starts with
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceSettings {
    pub username: String,
    pub password: String,
    pub activity_mode: ActivityMode,
    pub matcher_mode: MatcherMode,
    pub log_level: LogLevel,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for ClientSettings {
    fn default() -> Self {
        let core = ClientConfig::default();
        Self {
            client_id: core.client_id,
            app_name: core.app_name,
            api_url: "https://api.trakt.tv".to_string(),
            login_path: "/auth/login".to_string(),
            max_retry_attempts: core.max_retry_attempts,
            read_timeout_secs: core.read_timeout_secs,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        let core = RuntimeConfig::default();
        Self {
            state_dir: None,
            singleton: true,
            lock_file_name: "companion.lock".to_string(),
            restart_grace_ms: core.restart_grace_ms,
            host_token_env: core.host_token_env,
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration with the standard priority order
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(LOCAL_CONFIG_FILE));

        if let Some(path) = config_file {
            if !path.exists() {
                return Err(CliError::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        let config: AppConfig = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a single file over the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        self.companion_config().validate()?;

        let api_url = self.api_url()?;
        match api_url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(CliError::Config(format!(
                    "API URL must use http or https, got {}",
                    other
                )))
            }
        }

        if !self.client.login_path.starts_with('/') {
            return Err(CliError::Config(
                "Login path must start with '/'".to_string(),
            ));
        }

        if self.client.request_timeout_secs == 0 {
            return Err(CliError::Config(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.runtime.singleton && self.runtime.lock_file_name.trim().is_empty() {
            return Err(CliError::Config(
                "Lock file name must not be empty when the singleton guard is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed base URL of the remote API
    pub fn api_url(&self) -> Result<Url> {
        Url::parse(&self.client.api_url).map_err(|e| {
            CliError::Config(format!("Invalid API URL {}: {}", self.client.api_url, e))
        })
    }

    /// Effective state directory
    pub fn state_dir(&self) -> PathBuf {
        self.runtime.state_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join("companion"))
                .unwrap_or_else(|| PathBuf::from(".companion"))
        })
    }

    /// Path of the JSON state store
    pub fn state_file(&self) -> PathBuf {
        self.state_dir().join("state.json")
    }

    /// Path of the status file written while running
    pub fn status_file(&self) -> PathBuf {
        self.state_dir().join("status.json")
    }

    /// Path of the singleton lock file, if the guard is enabled
    pub fn lock_file(&self) -> Option<PathBuf> {
        self.runtime
            .singleton
            .then(|| self.state_dir().join(&self.runtime.lock_file_name))
    }

    /// Configuration handed to the runtime builder
    pub fn companion_config(&self) -> CompanionConfig {
        CompanionConfig {
            auth: self.auth.clone(),
            client: ClientConfig {
                client_id: self.client.client_id.clone(),
                app_name: self.client.app_name.clone(),
                version: VERSION.to_string(),
                max_retry_attempts: self.client.max_retry_attempts,
                read_timeout_secs: self.client.read_timeout_secs,
            },
            runtime: RuntimeConfig {
                lock_file: self.lock_file(),
                restart_grace_ms: self.runtime.restart_grace_ms,
                host_token_env: self.runtime.host_token_env.clone(),
            },
        }
    }

    /// Preferences as configured
    pub fn preferences(&self) -> Preferences {
        let settings = &self.preferences;
        Preferences {
            username: settings.username.clone(),
            password: settings.password.clone(),
            activity_mode: settings.activity_mode,
            matcher_mode: settings.matcher_mode,
            log_level: settings.log_level,
            ..Default::default()
        }
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example_config = AppConfig {
            runtime: RuntimeSettings {
                state_dir: Some(PathBuf::from("/var/lib/companion")),
                ..Default::default()
            },
            preferences: PreferenceSettings {
                username: "my-account".to_string(),
                password: "change-me".to_string(),
                activity_mode: ActivityMode::Logging,
                ..Default::default()
            },
            ..Default::default()
        };

        toml::to_string_pretty(&example_config)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
