//! Host Collaborator Traits
//!
//! Capabilities the embedding host provides: the singleton marker, process
//! restart, log-level control, the activity feed and the live preferences.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::CompanionResult;
use crate::types::{ActivityMode, LogLevel, Preferences};

// ----------------------------------------------------------------------------
// Process Capabilities
// ----------------------------------------------------------------------------

/// Advisory process-wide exclusive marker
pub trait SingletonGuard: Send + Sync {
    /// Try to take the marker
    ///
    /// Returns `false` when another instance holds it. Never blocks. Only the
    /// first call attempts acquisition; later calls report the first result.
    fn acquire(&self) -> bool;
}

/// Tears the companion down and brings it back up
#[async_trait::async_trait]
pub trait Restarter: Send + Sync {
    async fn restart(&self) -> CompanionResult<()>;
}

/// Lightweight log re-initialization
pub trait LogControl: Send + Sync {
    fn reinitialize(&self, level: LogLevel) -> CompanionResult<()>;
}

/// The host's activity/event-notification feed
#[async_trait::async_trait]
pub trait ActivityFeed: Send + Sync {
    /// Begin delivering events using the selected mechanism
    async fn start(&self, mode: ActivityMode) -> CompanionResult<()>;
}

// ----------------------------------------------------------------------------
// Preference Source
// ----------------------------------------------------------------------------

/// Read access to the host-owned preferences
///
/// Every read returns the then-current values; retries scheduled long ago see
/// whatever the user has entered since.
pub trait PreferenceSource: Send + Sync {
    fn snapshot(&self) -> Preferences;

    /// Write back the outcome of the last validation
    fn record_validity(&self, valid: bool);
}

/// Preferences shared between the host UI and the core
#[derive(Debug, Clone, Default)]
pub struct SharedPreferences {
    inner: Arc<RwLock<Preferences>>,
}

impl SharedPreferences {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            inner: Arc::new(RwLock::new(preferences)),
        }
    }

    /// Swap in a freshly edited set, keeping the recorded validity
    pub fn replace(&self, mut preferences: Preferences) {
        let mut guard = self.inner.write();
        preferences.valid = guard.valid;
        *guard = preferences;
    }

    /// Apply an in-place edit
    pub fn update<F: FnOnce(&mut Preferences)>(&self, edit: F) {
        edit(&mut self.inner.write());
    }
}

impl PreferenceSource for SharedPreferences {
    fn snapshot(&self) -> Preferences {
        self.inner.read().clone()
    }

    fn record_validity(&self, valid: bool) {
        self.inner.write().valid = valid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_keeps_validity() {
        let shared = SharedPreferences::new(Preferences::with_credentials("a", "b"));
        shared.record_validity(false);

        shared.replace(Preferences::with_credentials("c", "d"));
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.username, "c");
        assert!(!snapshot.valid);
    }

    #[test]
    fn test_clones_share_state() {
        let shared = SharedPreferences::default();
        let other = shared.clone();
        other.update(|prefs| prefs.username = "late".to_string());
        assert_eq!(shared.snapshot().username, "late");
    }
}
