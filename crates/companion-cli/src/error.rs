//! Error handling for the companion CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Companion error: {0}")]
    Companion(#[from] companion_core::CompanionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration loading error: {0}")]
    ConfigLoading(#[from] figment::Error),

    #[error("State persistence error: {0}")]
    StatePersistence(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
