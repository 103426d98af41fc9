use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use thiserror::Error;
use tokio::task::JoinHandle;

/// A spawned task that raised, panicked or was aborted before yielding a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{task} task failed: {reason}")]
pub struct TaskFailure {
    pub task: &'static str,
    pub reason: String,
}

impl TaskFailure {
    pub fn new(task: &'static str, reason: impl Into<String>) -> Self {
        Self {
            task,
            reason: reason.into(),
        }
    }
}

/// Single-consumer completion of a spawned task.
///
/// `wait` takes the handle by value, so a completion is observed exactly once.
#[derive(Debug)]
pub struct TaskHandle<T> {
    label: &'static str,
    handle: JoinHandle<anyhow::Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn wait(self) -> Result<T, TaskFailure> {
        match self.handle.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(TaskFailure::new(self.label, format!("{error:#}"))),
            Err(join_error) if join_error.is_cancelled() => {
                Err(TaskFailure::new(self.label, "task was cancelled"))
            }
            Err(join_error) => Err(TaskFailure::new(
                self.label,
                format!("task panicked: {join_error}"),
            )),
        }
    }
}

/// Spawns provisioning work on the ambient tokio runtime.
///
/// Once shut down, `submit` yields no handle. The same happens when no
/// runtime is active on the calling thread.
#[derive(Debug, Clone, Default)]
pub struct TaskQueue {
    shutdown: Arc<AtomicBool>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn submit<T, F>(&self, label: &'static str, task: F) -> Option<TaskHandle<T>>
    where
        T: Send + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        if self.is_shutdown() {
            tracing::warn!(task = label, "task queue is shut down; submission refused");
            return None;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(task = label, "no tokio runtime available; submission refused");
            return None;
        };
        tracing::debug!(task = label, "task submitted");
        Some(TaskHandle {
            label,
            handle: runtime.spawn(task),
        })
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::{TaskFailure, TaskQueue};

    #[tokio::test]
    async fn functional_submitted_task_yields_its_value_once() {
        let queue = TaskQueue::new();
        let handle = queue
            .submit("bootstrap", async { Ok(7_i32) })
            .expect("queue accepts work");
        assert_eq!(handle.label(), "bootstrap");
        assert_eq!(handle.wait().await, Ok(7));
    }

    #[tokio::test]
    async fn functional_task_error_becomes_task_failure() {
        let queue = TaskQueue::new();
        let handle = queue
            .submit::<(), _>("add-model", async { Err(anyhow!("engine exploded")) })
            .expect("queue accepts work");
        let failure = handle.wait().await.expect_err("task raised");
        assert_eq!(failure, TaskFailure::new("add-model", "engine exploded"));
        assert_eq!(failure.to_string(), "add-model task failed: engine exploded");
    }

    #[tokio::test]
    async fn regression_panicking_task_is_reported_not_propagated() {
        let queue = TaskQueue::new();
        let handle = queue
            .submit::<(), _>("hook", async { panic!("boom") })
            .expect("queue accepts work");
        let failure = handle.wait().await.expect_err("task panicked");
        assert!(failure.reason.starts_with("task panicked"));
    }

    #[tokio::test]
    async fn unit_shutdown_queue_refuses_submissions() {
        let queue = TaskQueue::new();
        let clone = queue.clone();
        clone.shutdown();
        assert!(queue.is_shutdown());
        assert!(queue.submit("bootstrap", async { Ok(()) }).is_none());
    }

    #[test]
    fn unit_submission_without_runtime_yields_no_handle() {
        let queue = TaskQueue::new();
        assert!(queue.submit("bootstrap", async { Ok(()) }).is_none());
    }
}
