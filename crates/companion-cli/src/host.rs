//! Companion host: wires the runtime to the CLI's collaborators and drives it
//!
//! `run` keeps the companion alive until Ctrl+C. A SIGHUP re-reads the
//! `[preferences]` section of the configuration and runs the validation
//! callback; an activity-mode change makes the companion request a restart,
//! which tears it down and builds a fresh one over the same store, client
//! and singleton guard.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use companion_core::{
    AuthPhase, AuthenticationState, CompanionError, CompanionResult, PreferenceSource, Restarter,
    SharedPreferences,
};
use companion_runtime::{Companion, CompanionBuilder, LockFileGuard, ValidationReport};

use crate::client::HttpAuthClient;
use crate::config::AppConfig;
use crate::error::Result;
use crate::logging::LogHandle;
use crate::modules::{LogActivityFeed, StateDirectory, StatusFile};
use crate::state::JsonFileStore;

// ----------------------------------------------------------------------------
// Restarter
// ----------------------------------------------------------------------------

/// Forwards restart requests to the host loop
#[derive(Debug, Clone)]
pub struct ChannelRestarter {
    sender: mpsc::Sender<()>,
}

impl ChannelRestarter {
    pub fn new(sender: mpsc::Sender<()>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Restarter for ChannelRestarter {
    async fn restart(&self) -> CompanionResult<()> {
        self.sender
            .send(())
            .await
            .map_err(|_| CompanionError::host("restart channel closed"))
    }
}

// ----------------------------------------------------------------------------
// Host
// ----------------------------------------------------------------------------

enum Next {
    Exit,
    Restart,
}

/// Owns the collaborators that outlive a single companion instance
pub struct CompanionHost {
    config: AppConfig,
    config_path: Option<PathBuf>,
    log: Option<Arc<LogHandle>>,
    store: Arc<JsonFileStore>,
    preferences: SharedPreferences,
    client: Arc<HttpAuthClient>,
    singleton: Option<Arc<LockFileGuard>>,
}

impl CompanionHost {
    pub fn new(
        config: AppConfig,
        config_path: Option<PathBuf>,
        log: Option<LogHandle>,
    ) -> Result<Self> {
        let store = Arc::new(JsonFileStore::open(config.state_file())?);
        let preferences = SharedPreferences::new(config.preferences());
        let client = Arc::new(
            HttpAuthClient::new(&config.api_url()?, &config.client.login_path)?
                .with_request_timeout(config.client.request_timeout()),
        );
        let singleton = config.lock_file().map(|path| Arc::new(LockFileGuard::new(path)));

        Ok(Self {
            config,
            config_path,
            log: log.map(Arc::new),
            store,
            preferences,
            client,
            singleton,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn preferences(&self) -> &SharedPreferences {
        &self.preferences
    }

    pub fn store(&self) -> &Arc<JsonFileStore> {
        &self.store
    }

    fn builder(&self) -> CompanionBuilder {
        let mut builder = CompanionBuilder::new(self.config.companion_config())
            .with_store(self.store.clone())
            .with_preferences(Arc::new(self.preferences.clone()))
            .with_auth_client(self.client.clone());

        if let Some(singleton) = &self.singleton {
            builder = builder.with_singleton(singleton.clone());
        }
        if let Some(log) = &self.log {
            builder = builder.with_log_control(log.clone());
        }
        builder
    }

    /// Companion with the CLI's modules and activity feed registered
    pub fn build_companion(&self, restarter: ChannelRestarter) -> Result<Companion> {
        let companion = self
            .builder()
            .with_restarter(Arc::new(restarter))
            .with_activity_feed(Arc::new(LogActivityFeed))
            .register_module(Arc::new(StateDirectory::new(self.config.state_dir())))
            .register_module(Arc::new(StatusFile::new(
                self.config.status_file(),
                self.preferences.clone(),
            )))
            .build()?;
        Ok(companion)
    }

    /// Authenticate once against the configured preferences
    ///
    /// Nothing is started; a retry scheduled by a transient failure is
    /// discarded with the companion.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let companion = self.builder().build()?;
        let report = companion.on_preferences_validated().await;
        companion.shutdown();
        Ok(report?)
    }

    /// Run until interrupted
    pub async fn run(&mut self) -> Result<()> {
        let (restart_tx, mut restart_rx) = mpsc::channel(1);
        let mut reload = ReloadSignal::new()?;

        loop {
            let companion = self.build_companion(ChannelRestarter::new(restart_tx.clone()))?;
            companion.on_start().await?;
            let watcher = tokio::spawn(watch_auth_state(companion.subscribe_auth()));

            info!("Companion running. Press Ctrl+C to stop");
            let next = loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down...");
                        break Next::Exit;
                    }
                    Some(()) = reload.recv() => {
                        if let Err(e) = self.reload_preferences() {
                            warn!("Keeping current preferences, reload failed: {}", e);
                            continue;
                        }
                        // Ctrl+C still wins while the verdict is pending
                        tokio::select! {
                            _ = report_validation(&companion) => {}
                            _ = tokio::signal::ctrl_c() => {
                                info!("Received Ctrl+C during validation, shutting down...");
                                break Next::Exit;
                            }
                        }
                    }
                    Some(()) = restart_rx.recv() => {
                        break Next::Restart;
                    }
                }
            };

            watcher.abort();
            companion.shutdown();

            match next {
                Next::Exit => break,
                Next::Restart => info!("Restarting companion"),
            }
        }

        if let Err(e) = std::fs::remove_file(self.config.status_file()) {
            debug!("Status file not removed: {}", e);
        }
        Ok(())
    }

    fn reload_preferences(&mut self) -> Result<()> {
        let reloaded = AppConfig::load(self.config_path.as_deref())?;
        self.config.preferences = reloaded.preferences;
        self.preferences.replace(self.config.preferences());
        debug!("Reloaded preferences {:?}", self.preferences.snapshot());
        Ok(())
    }
}

async fn report_validation(companion: &Companion) {
    match companion.on_preferences_validated().await {
        Ok(report) => {
            if report.message.is_success() {
                info!("{}", report.message);
            } else {
                warn!("{}", report.message);
            }
        }
        Err(e) => error!("Preference validation failed: {}", e),
    }
}

/// Log authentication state transitions
pub async fn watch_auth_state(mut state: watch::Receiver<AuthenticationState>) {
    let mut last = state.borrow_and_update().phase;
    while state.changed().await.is_ok() {
        let current = state.borrow_and_update().clone();
        if current.phase == last {
            continue;
        }
        last = current.phase;

        match current.phase {
            AuthPhase::Authenticated => info!(
                "Authenticated as {}",
                current.username().unwrap_or("<unknown>")
            ),
            AuthPhase::FailedRetryable => info!(
                "Authentication retry in {} seconds",
                current.retry_interval.as_secs()
            ),
            phase => debug!("Authentication state: {}", phase),
        }
    }
}

// ----------------------------------------------------------------------------
// Reload Signal
// ----------------------------------------------------------------------------

/// SIGHUP on unix; never fires elsewhere
struct ReloadSignal {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
        })
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) -> Option<()> {
        self.hangup.recv().await
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) -> Option<()> {
        std::future::pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_restarter_delivers_request() {
        let (tx, mut rx) = mpsc::channel(1);
        let restarter = ChannelRestarter::new(tx);

        restarter.restart().await.unwrap();
        assert_eq!(rx.recv().await, Some(()));
    }

    #[tokio::test]
    async fn test_channel_restarter_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let err = ChannelRestarter::new(tx).restart().await.unwrap_err();
        assert!(matches!(err, CompanionError::Host { .. }));
    }
}
