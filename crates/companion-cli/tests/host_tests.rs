//! Host wiring without network access

use companion_cli::{AppConfig, ChannelRestarter, CompanionHost, RunStatus};
use companion_core::{keys, ActivityMode, AuthPhase, StateStore};
use tokio::sync::mpsc;

fn config_in(dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.runtime.state_dir = Some(dir.join("state"));
    config.client.api_url = "http://127.0.0.1:9".to_string();
    config.preferences.activity_mode = ActivityMode::Logging;
    config
}

#[tokio::test]
async fn test_validate_reports_empty_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let host = CompanionHost::new(config_in(dir.path()), None, None).unwrap();

    let report = host.validate().await.unwrap();

    assert_eq!(report.message.title, "Error");
    assert!(report.message.body.contains("field empty"));
    assert!(!report.restart_scheduled);
    assert_eq!(host.store().get_bool(keys::PREFERENCES_VALID), Some(false));
}

#[tokio::test]
async fn test_companion_starts_modules_in_state_dir() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let status_file = config.status_file();
    let lock_file = config.lock_file().unwrap();
    let host = CompanionHost::new(config, None, None).unwrap();

    let (tx, _rx) = mpsc::channel(1);
    let companion = host.build_companion(ChannelRestarter::new(tx)).unwrap();
    companion.on_start().await.unwrap();

    assert!(lock_file.exists());
    let status = RunStatus::load_from_file(&status_file).unwrap().unwrap();
    assert_eq!(status.activity_mode, ActivityMode::Logging);

    let mut state = companion.subscribe_auth();
    while state.borrow_and_update().phase != AuthPhase::FailedTerminal {
        state.changed().await.unwrap();
    }
    assert_eq!(
        host.store().get_str(keys::PREFERENCES_ACTIVITY_MODE).as_deref(),
        Some("logging")
    );

    companion.shutdown();
}
