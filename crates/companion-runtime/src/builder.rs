//! Companion Builder API
//!
//! Hosts inject their collaborators and modules through the builder and get a
//! `Companion` exposing the two entry points. The state store, preference
//! source and remote auth client are required; everything else has a default.

use std::sync::Arc;

use companion_core::{
    ActivityFeed, CompanionConfig, CompanionError, CompanionResult, LogControl, ModuleHandle,
    PreferenceSource, RemoteAuthClient, Restarter, Scheduler, SingletonGuard, StateStore,
};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::authenticator::Authenticator;
use crate::lifecycle::ModuleRegistry;
use crate::reconciler::{ConfigurationReconciler, PreferenceApplier};
use crate::runtime::Companion;
use crate::scheduler::TokioScheduler;
use crate::singleton::{LockFileGuard, UnguardedSingleton};
use crate::supervisor::TaskSupervisor;

// ----------------------------------------------------------------------------
// Companion Builder
// ----------------------------------------------------------------------------

pub struct CompanionBuilder {
    config: CompanionConfig,
    store: Option<Arc<dyn StateStore>>,
    preferences: Option<Arc<dyn PreferenceSource>>,
    client: Option<Arc<dyn RemoteAuthClient>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    singleton: Option<Arc<dyn SingletonGuard>>,
    restarter: Option<Arc<dyn Restarter>>,
    log_control: Option<Arc<dyn LogControl>>,
    activity_feed: Option<Arc<dyn ActivityFeed>>,
    modules: Vec<ModuleHandle>,
    host_token: Option<Option<String>>,
}

impl CompanionBuilder {
    pub fn new(config: CompanionConfig) -> Self {
        Self {
            config,
            store: None,
            preferences: None,
            client: None,
            scheduler: None,
            singleton: None,
            restarter: None,
            log_control: None,
            activity_feed: None,
            modules: Vec::new(),
            host_token: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_preferences(mut self, preferences: Arc<dyn PreferenceSource>) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_auth_client(mut self, client: Arc<dyn RemoteAuthClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Replace the tokio-backed scheduler
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Replace the lock-file guard derived from `runtime.lock_file`
    pub fn with_singleton(mut self, singleton: Arc<dyn SingletonGuard>) -> Self {
        self.singleton = Some(singleton);
        self
    }

    pub fn with_restarter(mut self, restarter: Arc<dyn Restarter>) -> Self {
        self.restarter = Some(restarter);
        self
    }

    pub fn with_log_control(mut self, log_control: Arc<dyn LogControl>) -> Self {
        self.log_control = Some(log_control);
        self
    }

    pub fn with_activity_feed(mut self, activity_feed: Arc<dyn ActivityFeed>) -> Self {
        self.activity_feed = Some(activity_feed);
        self
    }

    /// Add a module; registration order is lifecycle order
    pub fn register_module(mut self, module: ModuleHandle) -> Self {
        self.modules.push(module);
        self
    }

    /// Use `token` instead of reading `runtime.host_token_env`
    pub fn with_host_token(mut self, token: Option<String>) -> Self {
        self.host_token = Some(token);
        self
    }

    /// Validate configuration, bootstrap the auth client and wire the engine
    pub fn build(self) -> CompanionResult<Companion> {
        info!("Building companion runtime");
        self.config.validate()?;
        let backoff = self.config.auth.backoff()?;

        let store = self
            .store
            .ok_or_else(|| CompanionError::missing_collaborator("state store"))?;
        let preferences = self
            .preferences
            .ok_or_else(|| CompanionError::missing_collaborator("preference source"))?;
        let client = self
            .client
            .ok_or_else(|| CompanionError::missing_collaborator("remote auth client"))?;

        let client_config = &self.config.client;
        client.configure(
            &client_config.client_id,
            &client_config.app_name,
            &client_config.version,
        );
        client.set_retry_policy(client_config.max_retry_attempts, client_config.read_timeout());

        let host_token = match self.host_token {
            Some(token) => token,
            None => std::env::var(&self.config.runtime.host_token_env).ok(),
        }
        .filter(|token| !token.is_empty());

        let (supervisor, reports) = TaskSupervisor::new();

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TokioScheduler::new(supervisor.clone())));

        let lock_file = &self.config.runtime.lock_file;
        let singleton: Arc<dyn SingletonGuard> = match (self.singleton, lock_file) {
            (Some(singleton), _) => singleton,
            (None, Some(path)) => Arc::new(LockFileGuard::new(path.clone())),
            (None, None) => Arc::new(UnguardedSingleton),
        };

        let applier = Arc::new(PreferenceApplier::new(store.clone(), preferences.clone()));
        let authenticator = Authenticator::new(
            store.clone(),
            preferences.clone(),
            client,
            scheduler,
            applier.clone(),
            backoff,
        );

        let mut reconciler = ConfigurationReconciler::new(
            authenticator.clone(),
            applier,
            preferences.clone(),
            supervisor.clone(),
            self.config.runtime.restart_grace(),
        );
        if let Some(restarter) = self.restarter {
            reconciler = reconciler.with_restarter(restarter);
        }
        if let Some(log_control) = self.log_control {
            reconciler = reconciler.with_log_control(log_control);
        }

        let mut registry = ModuleRegistry::new();
        for module in self.modules {
            registry.register(module)?;
        }
        debug!("Registered {} modules", registry.len());

        Ok(Companion {
            config: self.config,
            singleton,
            registry: tokio::sync::Mutex::new(registry),
            authenticator,
            reconciler,
            preferences,
            activity_feed: self.activity_feed,
            supervisor,
            reports: Mutex::new(Some(reports)),
            host_token,
        })
    }
}
