//! Configuration Reconciler
//!
//! `PreferenceApplier` normalizes the host's preferences, persists the derived
//! entries and publishes the matcher feature flags. `ConfigurationReconciler`
//! handles the host's validation callback: it authenticates, builds the
//! user-facing message and decides between a full restart (activity mode
//! changed) and a log-level re-initialization.

use core::time::Duration;
use std::sync::Arc;

use companion_core::{
    keys, ActivityMode, CompanionResult, LogControl, MatcherFlags, PreferenceSource, Preferences,
    Restarter, StateStore, ValidationMessage,
};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::authenticator::{AuthOutcome, Authenticator, ValidityListener};
use crate::supervisor::TaskSupervisor;

// ----------------------------------------------------------------------------
// Preference Applier
// ----------------------------------------------------------------------------

pub struct PreferenceApplier {
    store: Arc<dyn StateStore>,
    preferences: Arc<dyn PreferenceSource>,
    matcher: watch::Sender<MatcherFlags>,
}

impl PreferenceApplier {
    pub fn new(store: Arc<dyn StateStore>, preferences: Arc<dyn PreferenceSource>) -> Self {
        let flags = preferences.snapshot().matcher_flags();
        let (matcher, _) = watch::channel(flags);
        Self {
            store,
            preferences,
            matcher,
        }
    }

    /// Normalize, persist and publish the current preferences
    ///
    /// Without a verdict the last stored validity is kept, or `true` if none
    /// was ever stored. Commits the store once.
    pub fn apply(&self, valid: Option<bool>) -> CompanionResult<Preferences> {
        let valid = valid
            .or_else(|| self.store.get_bool(keys::PREFERENCES_VALID))
            .unwrap_or(true);
        self.preferences.record_validity(valid);

        let mut preferences = self.preferences.snapshot().normalized();
        preferences.valid = valid;

        self.store.set(keys::PREFERENCES_VALID, valid.into());
        self.store.set(
            keys::PREFERENCES_MATCHER_MODE,
            preferences.matcher_mode.as_str().into(),
        );
        self.store.set(
            keys::PREFERENCES_ACTIVITY_MODE,
            preferences.activity_mode.as_str().into(),
        );
        self.store.commit()?;

        self.matcher.send_replace(preferences.matcher_flags());

        info!("Preferences updated {:?}", preferences);
        Ok(preferences)
    }

    /// Activity mode recorded by the last `apply`
    pub fn recorded_activity_mode(&self) -> Option<ActivityMode> {
        self.store
            .get_str(keys::PREFERENCES_ACTIVITY_MODE)
            .and_then(|mode| mode.parse().ok())
    }

    pub fn matcher_flags(&self) -> MatcherFlags {
        *self.matcher.borrow()
    }

    /// Receive matcher flag updates
    pub fn subscribe_matcher(&self) -> watch::Receiver<MatcherFlags> {
        self.matcher.subscribe()
    }
}

impl ValidityListener for PreferenceApplier {
    fn validity_changed(&self, valid: bool) -> CompanionResult<()> {
        self.apply(Some(valid)).map(|_| ())
    }
}

// ----------------------------------------------------------------------------
// Configuration Reconciler
// ----------------------------------------------------------------------------

/// Outcome of a preference validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub message: ValidationMessage,
    pub outcome: AuthOutcome,
    pub restart_scheduled: bool,
}

pub struct ConfigurationReconciler {
    authenticator: Arc<Authenticator>,
    applier: Arc<PreferenceApplier>,
    preferences: Arc<dyn PreferenceSource>,
    restarter: Option<Arc<dyn Restarter>>,
    log_control: Option<Arc<dyn LogControl>>,
    supervisor: TaskSupervisor,
    restart_grace: Duration,
}

impl ConfigurationReconciler {
    pub fn new(
        authenticator: Arc<Authenticator>,
        applier: Arc<PreferenceApplier>,
        preferences: Arc<dyn PreferenceSource>,
        supervisor: TaskSupervisor,
        restart_grace: Duration,
    ) -> Self {
        Self {
            authenticator,
            applier,
            preferences,
            restarter: None,
            log_control: None,
            supervisor,
            restart_grace,
        }
    }

    pub fn with_restarter(mut self, restarter: Arc<dyn Restarter>) -> Self {
        self.restarter = Some(restarter);
        self
    }

    pub fn with_log_control(mut self, log_control: Arc<dyn LogControl>) -> Self {
        self.log_control = Some(log_control);
        self
    }

    pub fn apply(&self, valid: Option<bool>) -> CompanionResult<Preferences> {
        self.applier.apply(valid)
    }

    pub fn applier(&self) -> &Arc<PreferenceApplier> {
        &self.applier
    }

    /// Authenticate against the edited preferences and reconcile the runtime
    ///
    /// `previous` is the activity mode recorded before the edit; `None` means
    /// nothing was recorded and never triggers a restart. The restart itself
    /// runs in the background after the grace delay so the message reaches the
    /// caller first.
    pub async fn on_preferences_validated(
        &self,
        previous: Option<ActivityMode>,
    ) -> CompanionResult<ValidationReport> {
        let outcome = self.authenticator.authenticate().await?;
        let message = outcome.message();
        let current = self.preferences.snapshot();

        let restart_scheduled = match previous {
            Some(previous) if previous != current.activity_mode => {
                info!(
                    "Activity mode has changed ({} -> {}), restarting...",
                    previous, current.activity_mode
                );
                self.schedule_restart()
            }
            _ => {
                self.reinitialize_logging(&current);
                false
            }
        };

        Ok(ValidationReport {
            message,
            outcome,
            restart_scheduled,
        })
    }

    fn schedule_restart(&self) -> bool {
        let Some(restarter) = self.restarter.clone() else {
            warn!("No restarter available, activity mode change applies on next launch");
            return false;
        };

        let grace = self.restart_grace;
        let spawned = self.supervisor.spawn("restart", async move {
            tokio::time::sleep(grace).await;
            restarter.restart().await
        });

        match spawned {
            Ok(_) => true,
            Err(e) => {
                warn!("Unable to schedule restart: {}", e);
                false
            }
        }
    }

    fn reinitialize_logging(&self, current: &Preferences) {
        let Some(log_control) = &self.log_control else {
            return;
        };
        match log_control.reinitialize(current.log_level) {
            Ok(()) => info!("Changed log level to {}", current.log_level),
            Err(e) => warn!("Unable to change log level: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::{MatcherMode, MemoryStore, SharedPreferences, StoreValue};

    fn applier_with(
        store: Arc<MemoryStore>,
        preferences: Preferences,
    ) -> (PreferenceApplier, SharedPreferences) {
        let shared = SharedPreferences::new(preferences);
        let applier = PreferenceApplier::new(store, Arc::new(shared.clone()));
        (applier, shared)
    }

    #[test]
    fn test_apply_defaults_validity_to_true() {
        let store = Arc::new(MemoryStore::new());
        let (applier, shared) = applier_with(store.clone(), Preferences::default());

        let applied = applier.apply(None).unwrap();
        assert!(applied.valid);
        assert!(shared.snapshot().valid);
        assert_eq!(
            store.committed().get(keys::PREFERENCES_VALID),
            Some(&StoreValue::Bool(true))
        );
        assert_eq!(store.commit_count(), 1);
    }

    #[test]
    fn test_apply_keeps_stored_validity() {
        let store = Arc::new(MemoryStore::with_entries([(keys::PREFERENCES_VALID, false)]));
        let (applier, shared) = applier_with(store.clone(), Preferences::default());

        applier.apply(None).unwrap();
        assert!(!shared.snapshot().valid);
        assert_eq!(store.get_bool(keys::PREFERENCES_VALID), Some(false));
    }

    #[test]
    fn test_apply_publishes_matcher_flags() {
        let store = Arc::new(MemoryStore::new());
        let mut preferences = Preferences::default();
        preferences.matcher_mode = MatcherMode::Plex;
        let (applier, shared) = applier_with(store.clone(), preferences);

        let mut flags = applier.subscribe_matcher();
        assert!(!flags.borrow().caper_enabled);

        shared.update(|prefs| prefs.matcher_mode = MatcherMode::PlexExtended);
        applier.apply(Some(true)).unwrap();

        assert!(flags.has_changed().unwrap());
        let current = *flags.borrow_and_update();
        assert!(current.caper_enabled && current.extend_enabled);
        assert_eq!(
            store.get_str(keys::PREFERENCES_MATCHER_MODE).as_deref(),
            Some("plex_extended")
        );
    }

    #[test]
    fn test_recorded_activity_mode() {
        let store = Arc::new(MemoryStore::new());
        let (applier, _) = applier_with(store, Preferences::default());
        assert_eq!(applier.recorded_activity_mode(), None);

        applier.apply(None).unwrap();
        assert_eq!(
            applier.recorded_activity_mode(),
            Some(ActivityMode::default())
        );
    }
}
