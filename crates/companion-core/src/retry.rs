//! Retry backoff for transient authentication failures
//!
//! Each attempt carries the interval it was scheduled with. After a retryable
//! failure the next delay is `min(ceiling, floor_secs(current * multiplier))`,
//! truncated to whole seconds. Independent attempts (startup, user validation)
//! always start from the floor; only scheduled retries carry a grown interval.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{CompanionError, CompanionResult};

pub const DEFAULT_RETRY_FLOOR_SECS: u64 = 30;
pub const DEFAULT_RETRY_CEILING_SECS: u64 = 60 * 30;
pub const DEFAULT_RETRY_MULTIPLIER: f64 = 1.3;

/// Exponential retry schedule bounded by a floor and a ceiling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryBackoff {
    floor: Duration,
    ceiling: Duration,
    multiplier: f64,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(DEFAULT_RETRY_FLOOR_SECS),
            ceiling: Duration::from_secs(DEFAULT_RETRY_CEILING_SECS),
            multiplier: DEFAULT_RETRY_MULTIPLIER,
        }
    }
}

impl RetryBackoff {
    pub fn new(floor: Duration, ceiling: Duration, multiplier: f64) -> CompanionResult<Self> {
        if floor.is_zero() {
            return Err(CompanionError::invalid_config(
                "retry_floor",
                "must be greater than zero",
            ));
        }
        if ceiling < floor {
            return Err(CompanionError::invalid_config(
                "retry_ceiling",
                format!(
                    "ceiling {}s is below floor {}s",
                    ceiling.as_secs(),
                    floor.as_secs()
                ),
            ));
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(CompanionError::invalid_config(
                "retry_multiplier",
                format!("{} must be a finite value >= 1.0", multiplier),
            ));
        }

        Ok(Self {
            floor,
            ceiling,
            multiplier,
        })
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Delay before the retry that follows an attempt carrying `current`
    pub fn next(&self, current: Duration) -> Duration {
        let current = current.max(self.floor);
        if current >= self.ceiling {
            return self.ceiling;
        }

        let grown = (current.as_secs() as f64 * self.multiplier) as u64;
        Duration::from_secs(grown).clamp(current, self.ceiling)
    }

    /// Intervals carried by successive attempts, starting at the floor
    pub fn intervals(&self) -> impl Iterator<Item = Duration> + '_ {
        core::iter::successors(Some(self.floor), move |current| Some(self.next(*current)))
    }
}
