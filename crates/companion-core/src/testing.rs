//! Scripted collaborators for deterministic tests
//!
//! Enabled with the `testing` feature. Every double records what the core did
//! to it so tests can assert on calls instead of timing.

use core::time::Duration;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::auth_client::{LoginError, RemoteAuthClient};
use crate::errors::{CompanionError, CompanionResult};
use crate::host::{ActivityFeed, LogControl, Restarter, SingletonGuard};
use crate::module::{Initializable, Module, Startable};
use crate::scheduler::{DeferredJob, ScheduleId, Scheduler};
use crate::types::{ActivityMode, LogLevel};

// ----------------------------------------------------------------------------
// Scripted Auth Client
// ----------------------------------------------------------------------------

/// Remote auth client that replays queued login results
#[derive(Default)]
pub struct ScriptedAuthClient {
    responses: Mutex<VecDeque<Result<String, LoginError>>>,
    logins: Mutex<Vec<(String, String)>>,
    active: Mutex<Option<(Option<String>, Option<String>)>>,
    configured: Mutex<Option<(String, String, String)>>,
    retry_policy: Mutex<Option<(u32, Duration)>>,
    gate: Mutex<Option<Arc<tokio::sync::Semaphore>>>,
}

impl ScriptedAuthClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful login returning `token`
    pub fn push_token<T: Into<String>>(&self, token: T) -> &Self {
        self.responses.lock().push_back(Ok(token.into()));
        self
    }

    /// Queue a failed login
    pub fn push_error(&self, error: LoginError) -> &Self {
        self.responses.lock().push_back(Err(error));
        self
    }

    /// Hold every login until a permit is added to the returned semaphore
    pub fn gated(&self) -> Arc<tokio::sync::Semaphore> {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    /// Recorded `(username, password)` pairs in call order
    pub fn logins(&self) -> Vec<(String, String)> {
        self.logins.lock().clone()
    }

    pub fn login_count(&self) -> usize {
        self.logins.lock().len()
    }

    /// Last pair pushed through `set_active_credentials`
    pub fn active_credentials(&self) -> Option<(Option<String>, Option<String>)> {
        self.active.lock().clone()
    }

    pub fn configured(&self) -> Option<(String, String, String)> {
        self.configured.lock().clone()
    }

    pub fn retry_policy(&self) -> Option<(u32, Duration)> {
        *self.retry_policy.lock()
    }
}

#[async_trait::async_trait]
impl RemoteAuthClient for ScriptedAuthClient {
    fn configure(&self, client_id: &str, app_name: &str, version: &str) {
        *self.configured.lock() = Some((
            client_id.to_string(),
            app_name.to_string(),
            version.to_string(),
        ));
    }

    fn set_retry_policy(&self, max_attempts: u32, read_timeout: Duration) {
        *self.retry_policy.lock() = Some((max_attempts, read_timeout));
    }

    async fn login(&self, username: &str, password: &str) -> Result<String, LoginError> {
        self.logins
            .lock()
            .push((username.to_string(), password.to_string()));

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LoginError::other("no scripted response")))
    }

    fn set_active_credentials(&self, username: Option<&str>, token: Option<&str>) {
        *self.active.lock() = Some((username.map(String::from), token.map(String::from)));
    }
}

// ----------------------------------------------------------------------------
// Recording Scheduler
// ----------------------------------------------------------------------------

/// A job captured by `RecordingScheduler`
#[derive(Clone)]
pub struct ScheduledJob {
    pub id: ScheduleId,
    pub initial_delay: Duration,
    pub repeat_interval: Option<Duration>,
    pub job: DeferredJob,
}

/// Scheduler that records jobs and runs them only when told to
#[derive(Default)]
pub struct RecordingScheduler {
    jobs: Mutex<VecDeque<ScheduledJob>>,
    total: AtomicUsize,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs scheduled and not yet run
    pub fn pending(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Jobs scheduled over the scheduler's lifetime
    pub fn total_scheduled(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Initial delays of the pending jobs in scheduling order
    pub fn pending_delays(&self) -> Vec<Duration> {
        self.jobs.lock().iter().map(|job| job.initial_delay).collect()
    }

    /// Run the oldest pending job to completion
    ///
    /// Returns the delay it had been scheduled with.
    pub async fn run_next(&self) -> Option<Duration> {
        let next = self.jobs.lock().pop_front();
        match next {
            Some(job) => {
                (job.job)().await;
                Some(job.initial_delay)
            }
            None => None,
        }
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule(
        &self,
        job: DeferredJob,
        initial_delay: Duration,
        repeat_interval: Option<Duration>,
    ) -> ScheduleId {
        let id = ScheduleId::new();
        self.jobs.lock().push_back(ScheduledJob {
            id,
            initial_delay,
            repeat_interval,
            job,
        });
        self.total.fetch_add(1, Ordering::SeqCst);
        id
    }
}

// ----------------------------------------------------------------------------
// Recording Module
// ----------------------------------------------------------------------------

/// Shared call journal used by several `RecordingModule`s
pub type CallJournal = Arc<Mutex<Vec<String>>>;

/// Module with configurable capabilities that journals each hook call
pub struct RecordingModule {
    name: String,
    initializable: bool,
    startable: bool,
    fail_on: Option<&'static str>,
    journal: CallJournal,
}

impl RecordingModule {
    pub fn new<N: Into<String>>(name: N, journal: CallJournal) -> Self {
        Self {
            name: name.into(),
            initializable: true,
            startable: true,
            fail_on: None,
            journal,
        }
    }

    pub fn initialize_only(mut self) -> Self {
        self.startable = false;
        self
    }

    pub fn start_only(mut self) -> Self {
        self.initializable = false;
        self
    }

    /// Neither capability
    pub fn inert(mut self) -> Self {
        self.initializable = false;
        self.startable = false;
        self
    }

    /// Fail the named hook ("initialize" or "start")
    pub fn failing(mut self, hook: &'static str) -> Self {
        self.fail_on = Some(hook);
        self
    }

    fn record(&self, hook: &'static str) -> CompanionResult<()> {
        self.journal.lock().push(format!("{}:{}", hook, self.name));
        if self.fail_on == Some(hook) {
            return Err(CompanionError::module(format!("{} refused to {}", self.name, hook)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Initializable for RecordingModule {
    async fn initialize(&self) -> CompanionResult<()> {
        self.record("initialize")
    }
}

#[async_trait::async_trait]
impl Startable for RecordingModule {
    async fn start(&self) -> CompanionResult<()> {
        self.record("start")
    }
}

impl Module for RecordingModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        if self.initializable {
            Some(self)
        } else {
            None
        }
    }

    fn as_startable(&self) -> Option<&dyn Startable> {
        if self.startable {
            Some(self)
        } else {
            None
        }
    }
}

// ----------------------------------------------------------------------------
// Host Doubles
// ----------------------------------------------------------------------------

/// Counts restart requests
#[derive(Default)]
pub struct RecordingRestarter {
    restarts: AtomicUsize,
}

impl RecordingRestarter {
    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Restarter for RecordingRestarter {
    async fn restart(&self) -> CompanionResult<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every log re-initialization
#[derive(Default)]
pub struct RecordingLogControl {
    levels: Mutex<Vec<LogLevel>>,
}

impl RecordingLogControl {
    pub fn levels(&self) -> Vec<LogLevel> {
        self.levels.lock().clone()
    }
}

impl LogControl for RecordingLogControl {
    fn reinitialize(&self, level: LogLevel) -> CompanionResult<()> {
        self.levels.lock().push(level);
        Ok(())
    }
}

/// Records the modes the feed was started with
#[derive(Default)]
pub struct RecordingActivityFeed {
    modes: Mutex<Vec<ActivityMode>>,
}

impl RecordingActivityFeed {
    pub fn modes(&self) -> Vec<ActivityMode> {
        self.modes.lock().clone()
    }
}

#[async_trait::async_trait]
impl ActivityFeed for RecordingActivityFeed {
    async fn start(&self, mode: ActivityMode) -> CompanionResult<()> {
        self.modes.lock().push(mode);
        Ok(())
    }
}

/// Singleton guard with a fixed answer
pub struct FixedGuard {
    available: bool,
    attempts: AtomicUsize,
    held: AtomicBool,
}

impl FixedGuard {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            attempts: AtomicUsize::new(0),
            held: AtomicBool::new(false),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SingletonGuard for FixedGuard {
    fn acquire(&self) -> bool {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            self.held.store(self.available, Ordering::SeqCst);
        }
        self.held.load(Ordering::SeqCst)
    }
}
