//! Tokio-backed deferred scheduler
//!
//! Each scheduled job becomes a supervised task that sleeps for the initial
//! delay, runs the job, then keeps running it on the repeat interval if one was
//! given.

use core::time::Duration;

use companion_core::{DeferredJob, ScheduleId, Scheduler};
use tracing::{debug, warn};

use crate::supervisor::TaskSupervisor;

/// Default scheduler used when the host does not supply one
#[derive(Clone)]
pub struct TokioScheduler {
    supervisor: TaskSupervisor,
}

impl TokioScheduler {
    pub fn new(supervisor: TaskSupervisor) -> Self {
        Self { supervisor }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(
        &self,
        job: DeferredJob,
        initial_delay: Duration,
        repeat_interval: Option<Duration>,
    ) -> ScheduleId {
        let id = ScheduleId::new();
        let task_name = format!("scheduled-{}", id);

        let spawned = self.supervisor.spawn(&task_name, async move {
            tokio::time::sleep(initial_delay).await;
            (job)().await;

            if let Some(interval) = repeat_interval {
                let mut ticker = tokio::time::interval_at(
                    tokio::time::Instant::now() + interval,
                    interval,
                );
                loop {
                    ticker.tick().await;
                    (job)().await;
                }
            }
            Ok(())
        });

        match spawned {
            Ok(_) => debug!("Scheduled job {} in {:?}", id, initial_delay),
            Err(e) => warn!("Dropped scheduled job {}: {}", id, e),
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_job(counter: Arc<AtomicUsize>) -> DeferredJob {
        Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_after_delay() {
        let (supervisor, _reports) = TaskSupervisor::new();
        let scheduler = TokioScheduler::new(supervisor);
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(counting_job(counter.clone()), Duration::from_secs(30), None);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeats_on_interval() {
        let (supervisor, _reports) = TaskSupervisor::new();
        let scheduler = TokioScheduler::new(supervisor.clone());
        let counter = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(
            counting_job(counter.clone()),
            Duration::from_secs(1),
            Some(Duration::from_secs(10)),
        );

        tokio::time::sleep(Duration::from_secs(32)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        supervisor.shutdown();
    }
}
