//! Modules and host capabilities registered by the CLI

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use companion_core::{
    ActivityFeed, ActivityMode, CompanionError, CompanionResult, Initializable, Module,
    PreferenceSource, SharedPreferences, Startable,
};

use crate::state::RunStatus;

// ----------------------------------------------------------------------------
// State Directory
// ----------------------------------------------------------------------------

/// Makes sure the state directory exists before anything writes to it
pub struct StateDirectory {
    path: PathBuf,
}

impl StateDirectory {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Initializable for StateDirectory {
    async fn initialize(&self) -> CompanionResult<()> {
        tokio::fs::create_dir_all(&self.path).await.map_err(|e| {
            CompanionError::module(format!(
                "cannot create state directory {}: {}",
                self.path.display(),
                e
            ))
        })?;
        debug!("State directory ready at {}", self.path.display());
        Ok(())
    }
}

impl Module for StateDirectory {
    fn name(&self) -> &str {
        "StateDirectory"
    }

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        Some(self)
    }
}

// ----------------------------------------------------------------------------
// Status File
// ----------------------------------------------------------------------------

/// Publishes a status file for the `status` command
pub struct StatusFile {
    path: PathBuf,
    preferences: SharedPreferences,
}

impl StatusFile {
    pub fn new<P: Into<PathBuf>>(path: P, preferences: SharedPreferences) -> Self {
        Self {
            path: path.into(),
            preferences,
        }
    }
}

#[async_trait]
impl Initializable for StatusFile {
    async fn initialize(&self) -> CompanionResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!("Removed stale status file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(CompanionError::module(format!(
                    "cannot remove status file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Startable for StatusFile {
    async fn start(&self) -> CompanionResult<()> {
        let status = RunStatus::current(self.preferences.snapshot().activity_mode);
        status
            .save_to_file(&self.path)
            .map_err(|e| CompanionError::module(e.to_string()))?;
        debug!("Wrote status file {}", self.path.display());
        Ok(())
    }
}

impl Module for StatusFile {
    fn name(&self) -> &str {
        "StatusFile"
    }

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        Some(self)
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        Some(self)
    }
}

// ----------------------------------------------------------------------------
// Activity Feed
// ----------------------------------------------------------------------------

/// Activity feed that only reports the mechanism it would use
#[derive(Debug, Default)]
pub struct LogActivityFeed;

#[async_trait]
impl ActivityFeed for LogActivityFeed {
    async fn start(&self, mode: ActivityMode) -> CompanionResult<()> {
        debug!("Listening for activity via {}", mode);
        Ok(())
    }
}
