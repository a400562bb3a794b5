//! Retry policy properties exercised through the public configuration API

use companion_core::{AuthConfig, CompanionConfig, RetryBackoff};
use std::time::Duration;

#[test]
fn test_interval_sequence_is_monotonic_and_bounded() {
    let backoff = AuthConfig::default().backoff().expect("default backoff");
    let ceiling = Duration::from_secs(1800);

    let intervals: Vec<Duration> = backoff.intervals().take(40).collect();
    assert_eq!(intervals[0], Duration::from_secs(30));
    assert_eq!(intervals[1], Duration::from_secs(39));
    assert_eq!(intervals[2], Duration::from_secs(50));

    for pair in intervals.windows(2) {
        assert!(pair[1] >= pair[0], "sequence decreased: {:?}", pair);
        assert!(pair[1] <= ceiling);
    }

    // Once the ceiling is reached the interval stays there
    let first_ceiling = intervals
        .iter()
        .position(|interval| *interval == ceiling)
        .expect("ceiling reached within 40 attempts");
    assert!(intervals[first_ceiling..].iter().all(|i| *i == ceiling));
}

#[test]
fn test_custom_bounds_from_config() {
    let config = AuthConfig {
        retry_floor_secs: 10,
        retry_ceiling_secs: 25,
        retry_multiplier: 2.0,
    };
    let backoff = config.backoff().unwrap();
    let intervals: Vec<u64> = backoff.intervals().take(4).map(|d| d.as_secs()).collect();
    assert_eq!(intervals, vec![10, 20, 25, 25]);
}

#[test]
fn test_invalid_retry_settings_fail_validation() {
    let mut config = CompanionConfig::default();
    config.auth.retry_multiplier = f64::NAN;
    assert!(config.validate().is_err());

    assert!(RetryBackoff::new(Duration::from_secs(1), Duration::from_secs(1), 1.0).is_ok());
}
