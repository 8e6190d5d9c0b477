//! The unit of work a job executes.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::ProgressReporter;

/// Result type for tasks.
pub type TaskResult = Result<(), TaskError>;

/// Future type for async tasks.
pub type TaskFuture = Pin<Box<dyn Future<Output = TaskResult> + Send>>;

/// Errors a task can fail with. The message ends up in the job's details.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lock(#[from] fs_lock::LockError),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    pub fn msg(message: impl Into<String>) -> Self {
        TaskError::Failed(message.into())
    }
}

/// Trait for job tasks.
///
/// Concrete tasks (scan, generate, identify, clean, export, plugin runs,
/// package installs) implement this single capability. `ctx` is cancelled
/// when the job is cancelled or the engine shuts down; long-running tasks
/// should check it between steps and return promptly.
pub trait Task: Send + Sync + 'static {
    /// Run the task to completion.
    fn execute(&self, ctx: CancellationToken, progress: ProgressReporter) -> TaskFuture;
}

impl std::fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Task")
    }
}

/// A simple function-based task.
pub struct FnTask<F> {
    f: F,
}

impl<F> FnTask<F> {
    /// Create a new function-based task.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Task for FnTask<F>
where
    F: Fn(CancellationToken, ProgressReporter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    fn execute(&self, ctx: CancellationToken, progress: ProgressReporter) -> TaskFuture {
        Box::pin((self.f)(ctx, progress))
    }
}

/// Build a task from an async closure.
pub fn task_fn<F, Fut>(f: F) -> FnTask<F>
where
    F: Fn(CancellationToken, ProgressReporter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    FnTask::new(f)
}
