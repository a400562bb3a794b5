//! Authentication state machine tests
//!
//! Drives the authenticator with a scripted remote client and a recording
//! scheduler so every retry is fired explicitly.

use core::time::Duration;
use std::sync::Arc;

use companion_core::testing::{RecordingScheduler, ScriptedAuthClient};
use companion_core::{
    keys, AuthPhase, LoginError, MemoryStore, PreferenceSource, Preferences, RetryBackoff,
    SharedPreferences, StateStore, StoreValue,
};
use companion_runtime::{
    AuthOutcome, Authenticator, PreferenceApplier, TaskSupervisor, TokioScheduler,
};

struct Harness {
    store: Arc<MemoryStore>,
    preferences: SharedPreferences,
    client: Arc<ScriptedAuthClient>,
    scheduler: Arc<RecordingScheduler>,
    authenticator: Arc<Authenticator>,
}

fn harness(preferences: Preferences, store: MemoryStore) -> Harness {
    harness_with_backoff(preferences, store, RetryBackoff::default())
}

fn harness_with_backoff(
    preferences: Preferences,
    store: MemoryStore,
    backoff: RetryBackoff,
) -> Harness {
    let store = Arc::new(store);
    let preferences = SharedPreferences::new(preferences);
    let client = Arc::new(ScriptedAuthClient::new());
    let scheduler = Arc::new(RecordingScheduler::new());
    let applier = Arc::new(PreferenceApplier::new(
        store.clone(),
        Arc::new(preferences.clone()),
    ));
    let authenticator = Authenticator::new(
        store.clone(),
        Arc::new(preferences.clone()),
        client.clone(),
        scheduler.clone(),
        applier,
        backoff,
    );

    Harness {
        store,
        preferences,
        client,
        scheduler,
        authenticator,
    }
}

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|s| Duration::from_secs(*s)).collect()
}

fn transient() -> LoginError {
    LoginError::other("connection reset by peer")
}

// ----------------------------------------------------------------------------
// Terminal Outcomes
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_empty_credentials_fail_without_retry() {
    for (username, password) in [("", ""), ("a", ""), ("", "secret"), ("   ", "secret")] {
        let h = harness(
            Preferences::with_credentials(username, password),
            MemoryStore::new(),
        );

        let outcome = h.authenticator.authenticate().await.unwrap();

        assert_eq!(outcome, AuthOutcome::CredentialsMissing);
        assert!(!outcome.is_success());
        assert!(outcome.message().body.contains("username or password field empty"));
        assert!(!h.preferences.snapshot().valid);
        assert_eq!(h.store.get_bool(keys::PREFERENCES_VALID), Some(false));
        assert_eq!(h.scheduler.total_scheduled(), 0);
        assert_eq!(h.client.login_count(), 0);
        assert_eq!(h.authenticator.state().phase, AuthPhase::FailedTerminal);
    }
}

#[tokio::test]
async fn test_successful_login_stores_pair() {
    let h = harness(Preferences::with_credentials("a", "right"), MemoryStore::new());
    h.client.push_token("T1");

    let outcome = h.authenticator.authenticate().await.unwrap();

    assert_eq!(
        outcome,
        AuthOutcome::Authenticated {
            username: "a".to_string(),
            reused_token: false,
        }
    );
    let committed = h.store.committed();
    assert_eq!(
        committed.get(keys::AUTH_TOKEN),
        Some(&StoreValue::Text("T1".to_string()))
    );
    assert_eq!(
        committed.get(keys::AUTH_USERNAME),
        Some(&StoreValue::Text("a".to_string()))
    );
    assert!(h.preferences.snapshot().valid);
    assert_eq!(committed.get(keys::PREFERENCES_VALID), Some(&StoreValue::Bool(true)));
    assert_eq!(
        h.client.active_credentials(),
        Some((Some("a".to_string()), Some("T1".to_string())))
    );

    let state = h.authenticator.state();
    assert_eq!(state.phase, AuthPhase::Authenticated);
    assert_eq!(state.username(), Some("a"));
    assert_eq!(state.token(), Some("T1"));
    assert!(state.valid);
}

#[tokio::test]
async fn test_username_is_trimmed_before_login() {
    let h = harness(Preferences::with_credentials("  a ", "right"), MemoryStore::new());
    h.client.push_token("T1");

    h.authenticator.authenticate().await.unwrap();

    assert_eq!(h.client.logins(), vec![("a".to_string(), "right".to_string())]);
    assert_eq!(h.store.get_str(keys::AUTH_USERNAME).as_deref(), Some("a"));
}

#[tokio::test]
async fn test_client_error_is_terminal() {
    let h = harness(Preferences::with_credentials("a", "wrong"), MemoryStore::new());
    h.client.push_error(LoginError::client(401, "invalid credentials"));

    let outcome = h.authenticator.authenticate().await.unwrap();

    assert!(matches!(outcome, AuthOutcome::Rejected { ref username, .. } if username == "a"));
    assert!(outcome.message().body.contains("incorrect username or password"));
    assert_eq!(h.store.get_str(keys::AUTH_TOKEN), None);
    assert_eq!(h.store.get_str(keys::AUTH_USERNAME), None);
    assert!(!h.preferences.snapshot().valid);
    assert_eq!(h.scheduler.total_scheduled(), 0);
    assert_eq!(h.client.active_credentials(), Some((None, None)));
    assert_eq!(h.authenticator.state().phase, AuthPhase::FailedTerminal);
}

// ----------------------------------------------------------------------------
// Stored Credentials
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_matching_stored_token_skips_login() {
    let store = MemoryStore::with_entries([(keys::AUTH_TOKEN, "T0"), (keys::AUTH_USERNAME, "a")]);
    let h = harness(Preferences::with_credentials("a", "right"), store);

    let outcome = h.authenticator.authenticate().await.unwrap();

    assert_eq!(
        outcome,
        AuthOutcome::Authenticated {
            username: "a".to_string(),
            reused_token: true,
        }
    );
    assert_eq!(h.client.login_count(), 0);
    assert_eq!(
        h.client.active_credentials(),
        Some((Some("a".to_string()), Some("T0".to_string())))
    );
}

#[tokio::test]
async fn test_stale_token_cleared_before_login() {
    let store = MemoryStore::with_entries([(keys::AUTH_TOKEN, "OLD"), (keys::AUTH_USERNAME, "b")]);
    let h = harness(Preferences::with_credentials("a", "pw"), store);
    h.client.push_error(LoginError::client(401, "invalid credentials"));
    let gate = h.client.gated();

    let authenticator = h.authenticator.clone();
    let attempt = tokio::spawn(async move { authenticator.authenticate().await });

    while h.client.login_count() == 0 {
        tokio::task::yield_now().await;
    }

    // The login is in flight; the stale pair is already gone from durable state
    let committed = h.store.committed();
    assert!(!committed.contains_key(keys::AUTH_TOKEN));
    assert!(!committed.contains_key(keys::AUTH_USERNAME));
    assert!(!h.authenticator.state().has_token());

    gate.add_permits(1);
    let outcome = attempt.await.unwrap().unwrap();
    assert!(matches!(outcome, AuthOutcome::Rejected { .. }));
    assert_eq!(h.client.logins(), vec![("a".to_string(), "pw".to_string())]);
}

// ----------------------------------------------------------------------------
// Retry Backoff
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_transient_failures_back_off() {
    let h = harness(Preferences::with_credentials("a", "right"), MemoryStore::new());
    for _ in 0..5 {
        h.client.push_error(transient());
    }

    let outcome = h.authenticator.authenticate().await.unwrap();
    assert!(matches!(
        outcome,
        AuthOutcome::RetryScheduled { retry_in, .. } if retry_in == Duration::from_secs(30)
    ));
    assert_eq!(h.scheduler.pending_delays(), secs(&[30]));

    for expected in [39, 50, 65, 84] {
        h.scheduler.run_next().await;
        assert_eq!(h.scheduler.pending_delays(), secs(&[expected]));
        assert_eq!(
            h.authenticator.state().retry_interval,
            Duration::from_secs(expected)
        );
    }

    assert_eq!(h.client.login_count(), 5);
    assert_eq!(h.authenticator.state().phase, AuthPhase::FailedRetryable);
}

#[tokio::test]
async fn test_transient_failure_leaves_validity_untouched() {
    let h = harness(Preferences::with_credentials("a", "right"), MemoryStore::new());
    h.preferences.record_validity(true);
    h.client.push_error(transient());

    let outcome = h.authenticator.authenticate().await.unwrap();

    assert!(outcome.error().is_some_and(|e| e.is_retryable()));
    assert!(h.preferences.snapshot().valid);
    assert_eq!(h.store.get_bool(keys::PREFERENCES_VALID), None);
    assert_eq!(h.store.get_str(keys::AUTH_TOKEN), None);
}

#[tokio::test]
async fn test_ceiling_is_sticky() {
    let backoff =
        RetryBackoff::new(Duration::from_secs(10), Duration::from_secs(20), 2.0).unwrap();
    let h = harness_with_backoff(
        Preferences::with_credentials("a", "right"),
        MemoryStore::new(),
        backoff,
    );
    for _ in 0..4 {
        h.client.push_error(transient());
    }

    h.authenticator.authenticate().await.unwrap();
    let mut observed = h.scheduler.pending_delays();
    for _ in 0..3 {
        h.scheduler.run_next().await;
        observed.extend(h.scheduler.pending_delays());
    }

    assert_eq!(observed, secs(&[10, 20, 20, 20]));
}

#[tokio::test]
async fn test_success_and_credential_change_reset_to_floor() {
    let h = harness(Preferences::with_credentials("a", "right"), MemoryStore::new());
    h.client.push_error(transient());
    h.client.push_error(transient());
    h.client.push_token("T1");

    h.authenticator.authenticate().await.unwrap();
    h.scheduler.run_next().await;
    assert_eq!(h.scheduler.pending_delays(), secs(&[39]));

    h.scheduler.run_next().await;
    assert_eq!(h.scheduler.pending(), 0);
    assert_eq!(h.authenticator.state().phase, AuthPhase::Authenticated);
    assert_eq!(
        h.authenticator.state().retry_interval,
        Duration::from_secs(30)
    );

    // New account: stale token is dropped and the next failure starts at the floor
    h.preferences.update(|prefs| prefs.username = "b".to_string());
    h.client.push_error(transient());

    let outcome = h.authenticator.authenticate().await.unwrap();
    assert!(matches!(
        outcome,
        AuthOutcome::RetryScheduled { retry_in, .. } if retry_in == Duration::from_secs(30)
    ));
}

#[tokio::test]
async fn test_pending_retry_uses_current_preferences() {
    let h = harness(Preferences::with_credentials("a", "old"), MemoryStore::new());
    h.client.push_error(transient());
    h.client.push_error(transient());
    h.client.push_error(transient());

    h.authenticator.authenticate().await.unwrap();
    h.scheduler.run_next().await;
    assert_eq!(h.scheduler.pending_delays(), secs(&[39]));

    // The pending retry still fires, reads the edit and restarts the sequence
    h.preferences.update(|prefs| prefs.password = "new".to_string());
    h.scheduler.run_next().await;

    assert_eq!(h.scheduler.pending_delays(), secs(&[30]));
    assert_eq!(
        h.client.logins().last(),
        Some(&("a".to_string(), "new".to_string()))
    );
}

#[tokio::test]
async fn test_repeated_failures_share_one_retry_chain() {
    let h = harness(Preferences::with_credentials("a", "right"), MemoryStore::new());
    for _ in 0..3 {
        h.client.push_error(transient());
    }

    h.authenticator.authenticate().await.unwrap();
    let outcome = h.authenticator.authenticate().await.unwrap();

    assert!(outcome.error().is_some_and(|e| e.is_retryable()));
    assert_eq!(h.client.login_count(), 2);
    assert_eq!(h.scheduler.total_scheduled(), 1);
    assert!(h.authenticator.retry_pending());

    // The surviving chain keeps growing its interval
    h.scheduler.run_next().await;
    assert_eq!(h.scheduler.pending_delays(), secs(&[39]));
    assert_eq!(h.scheduler.total_scheduled(), 2);
}

#[tokio::test]
async fn test_edited_credentials_absorb_the_older_chain() {
    let h = harness(Preferences::with_credentials("a", "old"), MemoryStore::new());
    for _ in 0..3 {
        h.client.push_error(transient());
    }

    h.authenticator.authenticate().await.unwrap();
    h.preferences.update(|prefs| prefs.password = "new".to_string());
    h.authenticator.authenticate().await.unwrap();
    assert_eq!(h.scheduler.pending_delays(), secs(&[30, 30]));

    // The older chain still fires, then defers to the chain for the new password
    h.scheduler.run_next().await;
    assert_eq!(h.scheduler.pending_delays(), secs(&[30]));
    assert_eq!(
        h.client.logins().last(),
        Some(&("a".to_string(), "new".to_string()))
    );

    h.scheduler.run_next().await;
    assert_eq!(h.scheduler.pending_delays(), secs(&[39]));
}

#[tokio::test(start_paused = true)]
async fn test_day_long_outage_keeps_task_table_bounded() {
    let store = Arc::new(MemoryStore::new());
    let preferences = SharedPreferences::new(Preferences::with_credentials("a", "right"));
    let client = Arc::new(ScriptedAuthClient::new());
    let (supervisor, _reports) = TaskSupervisor::new();
    let applier = Arc::new(PreferenceApplier::new(
        store.clone(),
        Arc::new(preferences.clone()),
    ));
    let authenticator = Authenticator::new(
        store,
        Arc::new(preferences),
        client.clone(),
        Arc::new(TokioScheduler::new(supervisor.clone())),
        applier,
        RetryBackoff::default(),
    );

    // No scripted responses: every login fails transiently
    authenticator.authenticate().await.unwrap();
    tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;

    assert!(client.login_count() > 50);
    assert!(supervisor.health_summary().len() <= 2);
    assert!(supervisor.running() <= 1);
    assert!(supervisor.is_healthy());

    supervisor.shutdown();
}

// ----------------------------------------------------------------------------
// Concurrency
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_overlapping_attempts_are_serialized() {
    let h = harness(Preferences::with_credentials("a", "right"), MemoryStore::new());
    h.client.push_token("T1");
    let gate = h.client.gated();

    let first = {
        let authenticator = h.authenticator.clone();
        tokio::spawn(async move { authenticator.authenticate().await })
    };
    let second = {
        let authenticator = h.authenticator.clone();
        tokio::spawn(async move { authenticator.authenticate().await })
    };

    while h.client.login_count() == 0 {
        tokio::task::yield_now().await;
    }
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(h.client.login_count(), 1);

    gate.add_permits(1);
    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(h.client.login_count(), 1);
}

#[tokio::test]
async fn test_state_changes_are_observable() {
    let h = harness(Preferences::with_credentials("a", "right"), MemoryStore::new());
    h.client.push_token("T1");
    let mut state = h.authenticator.subscribe();
    assert_eq!(state.borrow_and_update().phase, AuthPhase::Unauthenticated);

    h.authenticator.authenticate().await.unwrap();

    assert!(state.has_changed().unwrap());
    assert_eq!(state.borrow_and_update().phase, AuthPhase::Authenticated);
}

#[tokio::test]
async fn test_restores_stored_pair_on_construction() {
    let store = MemoryStore::with_entries([(keys::AUTH_TOKEN, "T0"), (keys::AUTH_USERNAME, "a")]);
    let h = harness(Preferences::with_credentials("a", "right"), store);

    let state = h.authenticator.state();
    assert_eq!(state.username(), Some("a"));
    assert_eq!(state.token(), Some("T0"));
    assert_eq!(state.phase, AuthPhase::Unauthenticated);
}
