//! Error types for the companion orchestrator
//!
//! Each concern gets its own enum (authentication, module lifecycle, persisted
//! state, configuration) and `CompanionError` unifies them. Only module
//! lifecycle errors are meant to escape to the host's top-level handler;
//! authentication errors are reduced to log lines and the persisted `valid` flag.

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Authentication failures, classified by whether a retry makes sense
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Username or password field empty")]
    CredentialsMissing,
    #[error("Credentials rejected for {username}: {reason}")]
    ClientRejected { username: String, reason: String },
    #[error("Authentication request failed: {reason}")]
    Transient { reason: String },
}

impl AuthError {
    /// Whether the authenticator should schedule another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Transient { .. })
    }
}

/// Module lifecycle failures
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Module {module} failed to initialize: {reason}")]
    Initialize { module: String, reason: String },
    #[error("Module {module} failed to start: {reason}")]
    Start { module: String, reason: String },
    #[error("Cannot {requested} while lifecycle is {current}")]
    OutOfOrder { requested: String, current: String },
}

/// Persisted state store failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("State store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("State store serialization failed: {reason}")]
    Serialization { reason: String },
    #[error("State store contents are corrupt: {reason}")]
    Corrupt { reason: String },
}

/// Configuration validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("Missing collaborator: {name}")]
    MissingCollaborator { name: String },
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Top-level error type for the companion orchestrator
#[derive(Debug, thiserror::Error)]
pub enum CompanionError {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A module reported a failure from inside its own initialize/start hook
    #[error("Module error: {reason}")]
    Module { reason: String },

    /// Restart or other host-side request could not be delivered
    #[error("Host error: {reason}")]
    Host { reason: String },

    /// Background task channel closed or task join failed
    #[error("Task error: {message}")]
    Task { message: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl CompanionError {
    /// Create a module error with a reason
    pub fn module<T: Into<String>>(reason: T) -> Self {
        CompanionError::Module {
            reason: reason.into(),
        }
    }

    /// Create a host error with a reason
    pub fn host<T: Into<String>>(reason: T) -> Self {
        CompanionError::Host {
            reason: reason.into(),
        }
    }

    /// Create a task error with a message
    pub fn task<T: Into<String>>(message: T) -> Self {
        CompanionError::Task {
            message: message.into(),
        }
    }

    /// Create an invalid configuration value error
    pub fn invalid_config<F: Into<String>, R: Into<String>>(field: F, reason: R) -> Self {
        CompanionError::Config(ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        })
    }

    /// Create a missing collaborator error
    pub fn missing_collaborator<T: Into<String>>(name: T) -> Self {
        CompanionError::Config(ConfigError::MissingCollaborator { name: name.into() })
    }

    /// Create a store serialization error
    pub fn store_serialization<T: Into<String>>(reason: T) -> Self {
        CompanionError::Store(StoreError::Serialization {
            reason: reason.into(),
        })
    }

    /// Create a store corruption error
    pub fn store_corrupt<T: Into<String>>(reason: T) -> Self {
        CompanionError::Store(StoreError::Corrupt {
            reason: reason.into(),
        })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type CompanionResult<T> = core::result::Result<T, CompanionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_retry() {
        assert!(!AuthError::CredentialsMissing.is_retryable());
        assert!(!AuthError::ClientRejected {
            username: "a".to_string(),
            reason: "401".to_string(),
        }
        .is_retryable());
        assert!(AuthError::Transient {
            reason: "timeout".to_string(),
        }
        .is_retryable());
    }

    #[test]
    fn test_lifecycle_error_names_module() {
        let err: CompanionError = LifecycleError::Start {
            module: "SyncManager".to_string(),
            reason: "boom".to_string(),
        }
        .into();
        let text = err.to_string();
        assert!(text.contains("SyncManager"));
        assert!(text.contains("boom"));
    }
}
