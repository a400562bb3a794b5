//! Companion Runtime
//!
//! The engine behind the companion process:
//! - `singleton`: advisory lock-file guard
//! - `lifecycle`: ordered module registry with two-phase startup
//! - `authenticator`: authentication state machine with backoff retries
//! - `reconciler`: preference application and restart/re-initialize decisions
//! - `supervisor`: supervised background tasks with completion reports
//! - `scheduler`: tokio-backed deferred scheduler
//!
//! Hosts assemble everything with `CompanionBuilder` and drive the resulting
//! `Companion` through `on_start` and `on_preferences_validated`.

pub mod authenticator;
pub mod builder;
pub mod lifecycle;
pub mod reconciler;
pub mod runtime;
pub mod scheduler;
pub mod singleton;
pub mod supervisor;

pub use authenticator::{AuthOutcome, Authenticator, ValidityListener};
pub use builder::CompanionBuilder;
pub use lifecycle::{LifecyclePhase, ModuleRegistry, PhaseReport};
pub use reconciler::{ConfigurationReconciler, PreferenceApplier, ValidationReport};
pub use runtime::Companion;
pub use scheduler::TokioScheduler;
pub use singleton::{LockFileGuard, UnguardedSingleton};
pub use supervisor::{
    TaskHealthStatus, TaskId, TaskOutcome, TaskReport, TaskReportReceiver, TaskSupervisor,
};
