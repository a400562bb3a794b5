//! Authenticator
//!
//! Owns the authentication state machine:
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated
//!                                   -> FailedTerminal   (absorbing until preferences change)
//!                                   -> FailedRetryable  (re-enters Authenticating after a backoff delay)
//! ```
//!
//! Stored credentials live in the state store under `auth.username` and
//! `auth.token`, always written as a pair. Retries are handed to the deferred
//! scheduler with an interval that grows by the backoff multiplier until it
//! reaches the ceiling. Only one attempt runs at a time; overlapping callers
//! wait for the running attempt and then run against current state. At most
//! one retry chain is pending per credential set: a transient failure while a
//! chain for the same credentials is waiting leaves that chain to retry.

use core::time::Duration;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use companion_core::{
    keys, AuthError, AuthPhase, AuthenticationState, CompanionResult, DeferredJob, LoginError,
    PreferenceSource, Preferences, RemoteAuthClient, RetryBackoff, Scheduler, StateStore,
    ValidationMessage,
};
use futures::FutureExt;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Validity Listener
// ----------------------------------------------------------------------------

/// Receives the verdict of every finished authentication attempt
pub trait ValidityListener: Send + Sync {
    fn validity_changed(&self, valid: bool) -> CompanionResult<()>;
}

// ----------------------------------------------------------------------------
// Outcome
// ----------------------------------------------------------------------------

/// Result of one authentication attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated { username: String, reused_token: bool },
    CredentialsMissing,
    Rejected { username: String, reason: String },
    RetryScheduled { reason: String, retry_in: Duration },
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Authenticated { .. })
    }

    /// The failure as an `AuthError`, if any
    pub fn error(&self) -> Option<AuthError> {
        match self {
            AuthOutcome::Authenticated { .. } => None,
            AuthOutcome::CredentialsMissing => Some(AuthError::CredentialsMissing),
            AuthOutcome::Rejected { username, reason } => Some(AuthError::ClientRejected {
                username: username.clone(),
                reason: reason.clone(),
            }),
            AuthOutcome::RetryScheduled { reason, .. } => Some(AuthError::Transient {
                reason: reason.clone(),
            }),
        }
    }

    /// User-facing message for the validation entry point
    pub fn message(&self) -> ValidationMessage {
        match self {
            AuthOutcome::Authenticated { .. } => {
                ValidationMessage::success("Authentication successful")
            }
            AuthOutcome::CredentialsMissing => {
                ValidationMessage::error("Authentication failed, username or password field empty")
            }
            AuthOutcome::Rejected { .. } => ValidationMessage::error(
                "Authentication failed, incorrect username or password",
            ),
            AuthOutcome::RetryScheduled { retry_in, .. } => ValidationMessage::error(format!(
                "Authentication failed, unable to reach the service (retrying in {} seconds)",
                retry_in.as_secs()
            )),
        }
    }
}

impl fmt::Display for AuthOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthOutcome::Authenticated {
                username,
                reused_token,
            } => write!(
                f,
                "authenticated as {} ({})",
                username,
                if *reused_token { "stored token" } else { "fresh login" }
            ),
            AuthOutcome::CredentialsMissing => f.write_str("credentials missing"),
            AuthOutcome::Rejected { username, reason } => {
                write!(f, "{} rejected: {}", username, reason)
            }
            AuthOutcome::RetryScheduled { reason, retry_in } => {
                write!(f, "retrying in {}s: {}", retry_in.as_secs(), reason)
            }
        }
    }
}

/// Credentials a retry chain was started with
#[derive(Clone, PartialEq, Eq)]
struct CredentialSet {
    username: String,
    password: String,
}

impl CredentialSet {
    fn of(preferences: &Preferences) -> Self {
        Self {
            username: preferences.username.clone(),
            password: preferences.password.clone(),
        }
    }
}

/// The retry chain currently waiting on the scheduler
struct PendingRetry {
    ticket: u64,
    credentials: CredentialSet,
}

/// What the login step concluded before post-processing
enum LoginStep {
    Token { reused: bool },
    Rejected(String),
    Transient(String),
}

// ----------------------------------------------------------------------------
// Authenticator
// ----------------------------------------------------------------------------

pub struct Authenticator {
    this: Weak<Authenticator>,
    store: Arc<dyn StateStore>,
    preferences: Arc<dyn PreferenceSource>,
    client: Arc<dyn RemoteAuthClient>,
    scheduler: Arc<dyn Scheduler>,
    listener: Arc<dyn ValidityListener>,
    backoff: RetryBackoff,
    in_flight: Mutex<()>,
    pending_retry: SyncMutex<Option<PendingRetry>>,
    next_ticket: AtomicU64,
    state: watch::Sender<AuthenticationState>,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn StateStore>,
        preferences: Arc<dyn PreferenceSource>,
        client: Arc<dyn RemoteAuthClient>,
        scheduler: Arc<dyn Scheduler>,
        listener: Arc<dyn ValidityListener>,
        backoff: RetryBackoff,
    ) -> Arc<Self> {
        let mut initial = AuthenticationState::new(backoff.floor());
        initial.set_credentials(
            store.get_str(keys::AUTH_USERNAME),
            store.get_str(keys::AUTH_TOKEN),
        );
        initial.valid = preferences.snapshot().valid;
        let (state, _) = watch::channel(initial);

        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            store,
            preferences,
            client,
            scheduler,
            listener,
            backoff,
            in_flight: Mutex::new(()),
            pending_retry: SyncMutex::new(None),
            next_ticket: AtomicU64::new(1),
            state,
        })
    }

    /// Current state snapshot
    pub fn state(&self) -> AuthenticationState {
        self.state.borrow().clone()
    }

    /// Watch every state transition
    pub fn subscribe(&self) -> watch::Receiver<AuthenticationState> {
        self.state.subscribe()
    }

    pub fn backoff(&self) -> &RetryBackoff {
        &self.backoff
    }

    /// Independent attempt, starting any retry sequence at the floor
    pub async fn authenticate(&self) -> CompanionResult<AuthOutcome> {
        self.authenticate_with_interval(self.backoff.floor()).await
    }

    /// Attempt carrying the interval reached by the retry chain so far
    pub async fn authenticate_with_interval(
        &self,
        retry_interval: Duration,
    ) -> CompanionResult<AuthOutcome> {
        self.attempt(retry_interval, None).await
    }

    /// True while a scheduled retry has not fired yet
    pub fn retry_pending(&self) -> bool {
        self.pending_retry.lock().is_some()
    }

    async fn attempt(
        &self,
        retry_interval: Duration,
        ticket: Option<u64>,
    ) -> CompanionResult<AuthOutcome> {
        let _attempt = self.in_flight.lock().await;
        if let Some(ticket) = ticket {
            let mut pending = self.pending_retry.lock();
            if pending.as_ref().is_some_and(|p| p.ticket == ticket) {
                *pending = None;
            }
        }
        self.transition(|state| state.phase = AuthPhase::Authenticating);

        let preferences = self.preferences.snapshot().normalized();

        if !preferences.has_credentials() {
            warn!("Authentication failed, username or password field empty");
            self.transition(|state| {
                state.phase = AuthPhase::FailedTerminal;
                state.valid = false;
                state.retry_interval = self.backoff.floor();
            });
            self.listener.validity_changed(false)?;
            return Ok(AuthOutcome::CredentialsMissing);
        }

        let username = preferences.username.clone();

        // Stored token belongs to a different account
        let stored_username = self.store.get_str(keys::AUTH_USERNAME);
        if self.store.get_str(keys::AUTH_TOKEN).is_some()
            && stored_username.as_deref() != Some(username.as_str())
        {
            self.clear_stored_credentials();
            self.store.commit()?;
            self.transition(|state| {
                state.clear_credentials();
                state.retry_interval = self.backoff.floor();
            });
            info!("Authentication cleared, username was changed");
        }

        let step = match self.store.get_str(keys::AUTH_TOKEN) {
            Some(_) => LoginStep::Token { reused: true },
            None => {
                let step = match self.client.login(&username, &preferences.password).await {
                    Ok(token) if !token.is_empty() => {
                        self.store.set(keys::AUTH_TOKEN, token.into());
                        self.store.set(keys::AUTH_USERNAME, username.as_str().into());
                        LoginStep::Token { reused: false }
                    }
                    Ok(_) => {
                        self.clear_stored_credentials();
                        LoginStep::Transient("service returned an empty token".to_string())
                    }
                    Err(e @ LoginError::Client { .. }) => {
                        warn!("Authentication failed: {}", e);
                        self.clear_stored_credentials();
                        LoginStep::Rejected(e.to_string())
                    }
                    Err(e) => {
                        error!("Authentication failed: {}", e);
                        self.clear_stored_credentials();
                        LoginStep::Transient(e.to_string())
                    }
                };
                self.store.commit()?;
                step
            }
        };

        // Push whatever pair is stored now, including an empty one
        let active_username = self.store.get_str(keys::AUTH_USERNAME);
        let active_token = self.store.get_str(keys::AUTH_TOKEN);
        self.client
            .set_active_credentials(active_username.as_deref(), active_token.as_deref());
        self.transition(|state| {
            state.set_credentials(active_username.clone(), active_token.clone())
        });

        match step {
            LoginStep::Token { reused } if active_token.is_some() => {
                info!("Authentication successful");
                self.transition(|state| {
                    state.phase = AuthPhase::Authenticated;
                    state.valid = true;
                    state.retry_interval = self.backoff.floor();
                });
                self.listener.validity_changed(true)?;
                Ok(AuthOutcome::Authenticated {
                    username,
                    reused_token: reused,
                })
            }
            LoginStep::Token { .. } => {
                // Token disappeared between the check and post-processing
                self.fail_retryable(
                    "stored token vanished".to_string(),
                    retry_interval,
                    &preferences,
                )
            }
            LoginStep::Rejected(reason) => {
                warn!("Authentication failed, username or password is incorrect");
                self.transition(|state| {
                    state.phase = AuthPhase::FailedTerminal;
                    state.valid = false;
                    state.retry_interval = self.backoff.floor();
                });
                self.listener.validity_changed(false)?;
                Ok(AuthOutcome::Rejected { username, reason })
            }
            LoginStep::Transient(reason) => {
                self.fail_retryable(reason, retry_interval, &preferences)
            }
        }
    }

    fn fail_retryable(
        &self,
        reason: String,
        retry_interval: Duration,
        preferences: &Preferences,
    ) -> CompanionResult<AuthOutcome> {
        let delay = retry_interval.clamp(self.backoff.floor(), self.backoff.ceiling());
        warn!(
            "Unable to authenticate with the remote service, will try again in {} seconds",
            delay.as_secs()
        );

        self.transition(|state| {
            state.phase = AuthPhase::FailedRetryable;
            state.retry_interval = delay;
        });

        let credentials = CredentialSet::of(preferences);
        let joined = self
            .pending_retry
            .lock()
            .as_ref()
            .is_some_and(|pending| pending.credentials == credentials);
        if joined {
            debug!("Authentication retry already pending for these credentials");
        } else {
            self.schedule_retry(delay, credentials);
        }

        Ok(AuthOutcome::RetryScheduled {
            reason,
            retry_in: delay,
        })
    }

    /// Run another attempt after `delay`, carrying the grown interval
    fn schedule_retry(&self, delay: Duration, credentials: CredentialSet) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        *self.pending_retry.lock() = Some(PendingRetry {
            ticket,
            credentials: credentials.clone(),
        });

        let this = self.this.clone();
        let following = self.backoff.next(delay);
        let job: DeferredJob = Arc::new(move || {
            let this = this.clone();
            let credentials = credentials.clone();
            async move {
                let Some(authenticator) = this.upgrade() else {
                    debug!("Authenticator dropped, skipping scheduled retry");
                    return;
                };

                // Edited credentials start a fresh sequence
                let current = CredentialSet::of(&authenticator.preferences.snapshot().normalized());
                let interval = if current == credentials {
                    following
                } else {
                    authenticator.backoff.floor()
                };

                if let Err(e) = authenticator.attempt(interval, Some(ticket)).await {
                    error!("Scheduled authentication retry failed: {}", e);
                }
            }
            .boxed()
        });

        let id = self.scheduler.schedule(job, delay, None);
        debug!("Authentication retry {} scheduled in {:?}", id, delay);
    }

    fn clear_stored_credentials(&self) {
        self.store.remove(keys::AUTH_TOKEN);
        self.store.remove(keys::AUTH_USERNAME);
    }

    fn transition<F: FnOnce(&mut AuthenticationState)>(&self, edit: F) {
        self.state.send_modify(edit);
    }
}
