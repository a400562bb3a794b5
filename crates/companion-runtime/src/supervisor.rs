//! Task Supervisor
//!
//! Every piece of background work the companion dispatches (the initial
//! authentication, scheduled retries, the delayed restart) runs under the
//! supervisor, which provides:
//! - Task spawning with a name and an identifier
//! - Completion/failure/panic reports delivered over a channel
//! - A health summary of running, failed and aborted tasks
//! - Shutdown that aborts whatever is still running

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use companion_core::{CompanionError, CompanionResult};
use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Task Reports
// ----------------------------------------------------------------------------

/// Identifier of a supervised task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(Uuid);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a supervised task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskHealthStatus {
    Running,
    Failed(String),
    Aborted,
}

/// How a supervised task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed(String),
    Panicked(String),
}

/// Sent to the coordinator when a supervised task finishes
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub name: String,
    pub outcome: TaskOutcome,
}

pub type TaskReportReceiver = mpsc::UnboundedReceiver<TaskReport>;

#[derive(Debug)]
struct TaskEntry {
    name: String,
    status: TaskHealthStatus,
    handle: Option<JoinHandle<()>>,
}

// ----------------------------------------------------------------------------
// Task Supervisor
// ----------------------------------------------------------------------------

struct SupervisorInner {
    tasks: DashMap<TaskId, TaskEntry>,
    report_sender: mpsc::UnboundedSender<TaskReport>,
    shutdown_requested: AtomicBool,
}

/// Spawns and tracks background tasks; cheap to clone
#[derive(Clone)]
pub struct TaskSupervisor {
    inner: Arc<SupervisorInner>,
}

impl TaskSupervisor {
    /// Create a supervisor and the receiving end of its report channel
    pub fn new() -> (Self, TaskReportReceiver) {
        let (report_sender, report_receiver) = mpsc::unbounded_channel();
        let supervisor = Self {
            inner: Arc::new(SupervisorInner {
                tasks: DashMap::new(),
                report_sender,
                shutdown_requested: AtomicBool::new(false),
            }),
        };
        (supervisor, report_receiver)
    }

    /// Spawn `task` under supervision
    ///
    /// Must be called from within a tokio runtime. After `shutdown()` the task
    /// is dropped without running and an error is returned.
    pub fn spawn<F>(&self, name: &str, task: F) -> CompanionResult<TaskId>
    where
        F: Future<Output = CompanionResult<()>> + Send + 'static,
    {
        if self.inner.shutdown_requested.load(Ordering::SeqCst) {
            return Err(CompanionError::task(format!(
                "supervisor is shut down, refusing to spawn {}",
                name
            )));
        }

        let task_id = TaskId(Uuid::new_v4());
        self.inner.tasks.insert(
            task_id,
            TaskEntry {
                name: name.to_string(),
                status: TaskHealthStatus::Running,
                handle: None,
            },
        );

        let inner = self.inner.clone();
        let task_name = name.to_string();
        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => TaskOutcome::Completed,
                Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
                Err(panic) => TaskOutcome::Panicked(panic_message(panic.as_ref())),
            };
            inner.finish(task_id, task_name, outcome);
        });

        if let Some(mut entry) = self.inner.tasks.get_mut(&task_id) {
            if entry.status == TaskHealthStatus::Running {
                entry.handle = Some(handle);
            }
        }

        debug!("Spawned supervised task {} ({})", name, task_id);
        Ok(task_id)
    }

    /// Current status of every task still tracked
    ///
    /// Tasks that completed normally are forgotten once they report.
    pub fn health_summary(&self) -> HashMap<TaskId, (String, TaskHealthStatus)> {
        self.inner
            .tasks
            .iter()
            .map(|entry| {
                (
                    *entry.key(),
                    (entry.value().name.clone(), entry.value().status.clone()),
                )
            })
            .collect()
    }

    pub fn status(&self, task_id: TaskId) -> Option<TaskHealthStatus> {
        self.inner
            .tasks
            .get(&task_id)
            .map(|entry| entry.status.clone())
    }

    /// Number of tasks still running
    pub fn running(&self) -> usize {
        self.inner
            .tasks
            .iter()
            .filter(|entry| entry.value().status == TaskHealthStatus::Running)
            .count()
    }

    /// True when no task has failed or panicked
    pub fn is_healthy(&self) -> bool {
        self.inner
            .tasks
            .iter()
            .all(|entry| !matches!(entry.value().status, TaskHealthStatus::Failed(_)))
    }

    /// Abort all running tasks and refuse new ones
    pub fn shutdown(&self) {
        info!("Supervisor shutdown requested");
        self.inner.shutdown_requested.store(true, Ordering::SeqCst);

        let mut aborted = 0;
        for mut entry in self.inner.tasks.iter_mut() {
            if entry.status == TaskHealthStatus::Running {
                if let Some(handle) = entry.handle.take() {
                    handle.abort();
                }
                entry.status = TaskHealthStatus::Aborted;
                aborted += 1;
            }
        }

        info!("Supervisor stopped, aborted {} running tasks", aborted);
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown_requested.load(Ordering::SeqCst)
    }
}

impl SupervisorInner {
    fn finish(&self, task_id: TaskId, name: String, outcome: TaskOutcome) {
        match &outcome {
            TaskOutcome::Completed => {
                self.tasks.remove(&task_id);
            }
            TaskOutcome::Failed(reason) | TaskOutcome::Panicked(reason) => {
                if let Some(mut entry) = self.tasks.get_mut(&task_id) {
                    entry.handle = None;
                    entry.status = TaskHealthStatus::Failed(reason.clone());
                }
            }
        }

        // Nobody listening is fine
        let _ = self.report_sender.send(TaskReport {
            task_id,
            name,
            outcome,
        });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}

// ----------------------------------------------------------------------------
// Report Monitor
// ----------------------------------------------------------------------------

/// Log task reports until every sender is gone
pub async fn log_task_reports(mut reports: TaskReportReceiver) {
    while let Some(report) = reports.recv().await {
        match report.outcome {
            TaskOutcome::Completed => {
                debug!("Task {} ({}) completed", report.name, report.task_id);
            }
            TaskOutcome::Failed(reason) => {
                warn!("Task {} ({}) failed: {}", report.name, report.task_id, reason);
            }
            TaskOutcome::Panicked(reason) => {
                error!("Task {} ({}) panicked: {}", report.name, report.task_id, reason);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[tokio::test]
    async fn test_reports_completion_and_failure() {
        let (supervisor, mut reports) = TaskSupervisor::new();

        let ok_id = supervisor.spawn("ok", async { Ok(()) }).unwrap();
        let first = reports.recv().await.unwrap();
        assert_eq!(first.task_id, ok_id);
        assert_eq!(first.outcome, TaskOutcome::Completed);
        assert_eq!(supervisor.status(ok_id), None);

        let bad_id = supervisor
            .spawn("bad", async { Err(CompanionError::module("nope")) })
            .unwrap();
        let second = reports.recv().await.unwrap();
        assert_eq!(second.task_id, bad_id);
        assert!(matches!(second.outcome, TaskOutcome::Failed(_)));
        assert!(matches!(
            supervisor.status(bad_id),
            Some(TaskHealthStatus::Failed(_))
        ));
        assert!(!supervisor.is_healthy());
    }

    #[tokio::test]
    async fn test_completed_tasks_are_forgotten() {
        let (supervisor, mut reports) = TaskSupervisor::new();

        for _ in 0..200 {
            supervisor.spawn("short", async { Ok(()) }).unwrap();
        }
        for _ in 0..200 {
            reports.recv().await.unwrap();
        }

        assert!(supervisor.health_summary().is_empty());
        assert_eq!(supervisor.running(), 0);
        assert!(supervisor.is_healthy());
    }

    #[tokio::test]
    async fn test_panics_are_contained() {
        let (supervisor, mut reports) = TaskSupervisor::new();
        supervisor
            .spawn("explodes", async {
                panic!("kaboom");
            })
            .unwrap();

        let report = reports.recv().await.unwrap();
        assert_eq!(report.outcome, TaskOutcome::Panicked("kaboom".to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_running_tasks() {
        let (supervisor, _reports) = TaskSupervisor::new();
        let id = supervisor
            .spawn("sleeper", async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .unwrap();

        tokio::task::yield_now().await;
        assert_eq!(supervisor.running(), 1);

        supervisor.shutdown();
        assert_eq!(supervisor.status(id), Some(TaskHealthStatus::Aborted));
        assert!(supervisor.spawn("late", async { Ok(()) }).is_err());
    }
}
