//! Deferred Scheduler Trait Definition
//!
//! The companion does not own an event loop. Delayed and repeated work is
//! handed to a scheduler supplied by the host (or the runtime's tokio-backed
//! default) which runs it without blocking the caller.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

/// Work handed to a scheduler
///
/// A factory rather than a single future so repeated schedules can run the job
/// more than once.
pub type DeferredJob = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Identifier of a scheduled job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScheduleId(Uuid);

impl ScheduleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ScheduleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accepts `(job, initial_delay, repeat_interval)` and runs the job asynchronously
pub trait Scheduler: Send + Sync {
    /// Run `job` after `initial_delay`, then every `repeat_interval` if given
    ///
    /// Must return immediately. Scheduled jobs are never cancelled by the core.
    fn schedule(
        &self,
        job: DeferredJob,
        initial_delay: Duration,
        repeat_interval: Option<Duration>,
    ) -> ScheduleId;
}
