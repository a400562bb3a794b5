//! Companion Runtime
//!
//! The two host entry points live here. `on_start` runs the full lifecycle:
//! singleton guard, preference application, module initialization, a
//! background authentication attempt, module start and the activity feed.
//! `on_preferences_validated` answers the host's validation callback.

use std::sync::Arc;

use companion_core::{
    ActivityFeed, AuthenticationState, CompanionConfig, CompanionResult, MatcherFlags,
    PreferenceSource, SingletonGuard,
};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::authenticator::Authenticator;
use crate::lifecycle::{LifecyclePhase, ModuleRegistry};
use crate::reconciler::{ConfigurationReconciler, ValidationReport};
use crate::supervisor::{log_task_reports, TaskReportReceiver, TaskSupervisor};

/// A wired companion; created by `CompanionBuilder`
pub struct Companion {
    pub(crate) config: CompanionConfig,
    pub(crate) singleton: Arc<dyn SingletonGuard>,
    pub(crate) registry: tokio::sync::Mutex<ModuleRegistry>,
    pub(crate) authenticator: Arc<Authenticator>,
    pub(crate) reconciler: ConfigurationReconciler,
    pub(crate) preferences: Arc<dyn PreferenceSource>,
    pub(crate) activity_feed: Option<Arc<dyn ActivityFeed>>,
    pub(crate) supervisor: TaskSupervisor,
    pub(crate) reports: Mutex<Option<TaskReportReceiver>>,
    pub(crate) host_token: Option<String>,
}

impl Companion {
    // ------------------------------------------------------------------------
    // Entry Points
    // ------------------------------------------------------------------------

    /// Begin the full lifecycle
    ///
    /// Returns once every module has started. Authentication runs in the
    /// background and is not awaited. Module failures abort the sequence and
    /// are returned as lifecycle errors.
    pub async fn on_start(&self) -> CompanionResult<()> {
        if !self.singleton.acquire() {
            warn!("Unable to acquire companion instance, continuing anyway");
        }

        info!(
            "Starting {} v{} (pid {})",
            self.config.client.app_name,
            self.config.client.version,
            std::process::id()
        );

        if let Some(reports) = self.reports.lock().take() {
            tokio::spawn(log_task_reports(reports));
        }

        self.reconciler.apply(None)?;

        let mut registry = self.registry.lock().await;
        registry.initialize_all().await?;

        info!(
            "Host token: {}",
            if self.host_token.is_some() {
                "available"
            } else {
                "unavailable"
            }
        );

        let authenticator = self.authenticator.clone();
        self.supervisor.spawn("authenticate", async move {
            let outcome = authenticator.authenticate().await?;
            debug!("Initial authentication finished: {}", outcome);
            Ok(())
        })?;

        registry.start_all().await?;
        drop(registry);

        if let Some(feed) = &self.activity_feed {
            let mode = self.preferences.snapshot().activity_mode;
            feed.start(mode).await?;
            info!("Activity feed started in {} mode", mode);
        }

        Ok(())
    }

    /// Re-authenticate after a preference edit and reconcile
    ///
    /// Compares against the activity mode recorded before this validation.
    pub async fn on_preferences_validated(&self) -> CompanionResult<ValidationReport> {
        let previous = self.reconciler.applier().recorded_activity_mode();
        let report = self.reconciler.on_preferences_validated(previous).await?;
        info!("Preferences validated: {}", report.message);
        Ok(report)
    }

    /// Abort background work; scheduled retries stop with the supervisor
    pub fn shutdown(&self) {
        self.supervisor.shutdown();
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Take the task report channel before `on_start` spawns the log monitor
    pub fn take_task_reports(&self) -> Option<TaskReportReceiver> {
        self.reports.lock().take()
    }

    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    pub fn auth_state(&self) -> AuthenticationState {
        self.authenticator.state()
    }

    pub fn subscribe_auth(&self) -> watch::Receiver<AuthenticationState> {
        self.authenticator.subscribe()
    }

    pub fn matcher_flags(&self) -> MatcherFlags {
        self.reconciler.applier().matcher_flags()
    }

    pub fn subscribe_matcher(&self) -> watch::Receiver<MatcherFlags> {
        self.reconciler.applier().subscribe_matcher()
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.supervisor
    }

    pub fn config(&self) -> &CompanionConfig {
        &self.config
    }

    pub fn has_host_token(&self) -> bool {
        self.host_token.is_some()
    }

    pub fn host_token(&self) -> Option<&str> {
        self.host_token.as_deref()
    }

    pub async fn lifecycle_phase(&self) -> LifecyclePhase {
        self.registry.lock().await.phase()
    }
}
