//! Bulk file operations as a job task.

use std::path::PathBuf;

use actors::{CancellationToken, ProgressReporter, Task, TaskError, TaskFuture};
use serde::{Deserialize, Serialize};

use crate::FileManager;

/// One step of a bulk file operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FileOperation {
    Delete { path: PathBuf },
    Move { from: PathBuf, to: PathBuf },
}

impl FileOperation {
    fn describe(&self) -> String {
        match self {
            FileOperation::Delete { path } => format!("Deleting {}", path.display()),
            FileOperation::Move { from, to } => {
                format!("Moving {} to {}", from.display(), to.display())
            }
        }
    }
}

/// Deletes and moves files one at a time, reporting each as a detail line.
///
/// A failed step is recorded and the remaining steps still run; the task
/// fails at the end if any step did. Cancellation stops before the next
/// step.
#[derive(Debug, Clone)]
pub struct FileOperationTask {
    files: FileManager,
    operations: Vec<FileOperation>,
}

impl FileOperationTask {
    pub fn new(files: FileManager, operations: Vec<FileOperation>) -> Self {
        Self { files, operations }
    }

    async fn run(self, ctx: CancellationToken, progress: ProgressReporter) -> Result<(), TaskError> {
        let total = self.operations.len();
        progress.set_total(total as u64);

        let mut failed = 0usize;
        for operation in &self.operations {
            if ctx.is_cancelled() {
                tracing::info!(job_id = %progress.job_id(), "File operations cancelled");
                return Ok(());
            }

            let step = match operation {
                FileOperation::Delete { path } => {
                    progress
                        .execute_subtask(operation.describe(), self.files.delete(path))
                        .await
                }
                FileOperation::Move { from, to } => {
                    progress
                        .execute_subtask(operation.describe(), self.files.rename(from, to))
                        .await
                }
            };

            if let Err(e) = step {
                failed += 1;
                tracing::warn!(job_id = %progress.job_id(), "{}: {}", operation.describe(), e);
                progress.add_detail(format!("Error: {e}"));
            }
            progress.increment();
        }

        if failed > 0 {
            return Err(TaskError::msg(format!(
                "{failed} of {total} file operations failed"
            )));
        }
        Ok(())
    }
}

impl Task for FileOperationTask {
    fn execute(&self, ctx: CancellationToken, progress: ProgressReporter) -> TaskFuture {
        Box::pin(self.clone().run(ctx, progress))
    }
}
