//! Companion Core
//!
//! Stable API definitions for the companion lifecycle orchestrator:
//! - Domain types (`Preferences`, `AuthenticationState`, activity and matcher modes)
//! - The error taxonomy shared by every crate in the workspace
//! - Collaborator traits the host injects (state store, remote auth client,
//!   deferred scheduler, singleton guard, restarter, log control, activity feed)
//! - Module capability traits for the two-phase lifecycle
//! - The retry backoff policy used by the authenticator
//!
//! The engine that drives these pieces lives in `companion-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod auth_client;
pub mod config;
pub mod errors;
pub mod host;
pub mod module;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use auth_client::{LoginError, RemoteAuthClient};
pub use config::{AuthConfig, ClientConfig, CompanionConfig, RuntimeConfig};
pub use errors::{
    AuthError, CompanionError, CompanionResult, ConfigError, LifecycleError, StoreError,
};
pub use host::{
    ActivityFeed, LogControl, PreferenceSource, Restarter, SharedPreferences, SingletonGuard,
};
pub use module::{Initializable, Module, ModuleHandle, Startable};
pub use retry::RetryBackoff;
pub use scheduler::{DeferredJob, ScheduleId, Scheduler};
pub use store::{keys, MemoryStore, StateStore, StoreValue};
pub use types::{
    ActivityMode, AuthPhase, AuthenticationState, LogLevel, MatcherFlags, MatcherMode,
    Preferences, ValidationMessage,
};

/// Crate version reported to the remote service and in the startup header
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
