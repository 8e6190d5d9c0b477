//! Demo jobs for exercising the engine by hand.

use std::time::Duration;

use api::{CancellationToken, Engine, EngineError, JobId, TaskError, task_fn};
use storage::{FileManager, FileOperation, FileOperationTask};

/// Submit one job per `kind[:arg]` request. With no requests, runs a small mix.
pub fn submit(
    engine: &Engine,
    files: &FileManager,
    requests: &[String],
) -> Result<Vec<JobId>, EngineError> {
    let defaults = ["echo:hello", "sleep:5", "fail"].map(String::from);
    let requests = if requests.is_empty() { &defaults[..] } else { requests };

    let mut ids = Vec::with_capacity(requests.len());
    for request in requests {
        let (kind, arg) = request.split_once(':').unwrap_or((request.as_str(), ""));
        let id = match kind {
            "echo" => echo(engine, arg.to_string())?,
            "sleep" => sleep(engine, arg.parse().unwrap_or(5))?,
            "fail" => fail(engine)?,
            "delete" if !arg.is_empty() => delete(engine, files, arg)?,
            _ => {
                tracing::warn!(request = %request, "Unknown demo job, skipping");
                continue;
            }
        };
        ids.push(id);
    }
    Ok(ids)
}

fn echo(engine: &Engine, message: String) -> Result<JobId, EngineError> {
    engine.add(
        format!("Echo {message}"),
        task_fn(move |_ctx, progress| {
            let message = message.clone();
            async move {
                tracing::info!("Echo job: {}", message);
                tokio::time::sleep(Duration::from_secs(1)).await;
                progress.add_detail(message);
                Ok(())
            }
        }),
    )
}

fn sleep(engine: &Engine, seconds: u64) -> Result<JobId, EngineError> {
    engine.add(
        format!("Sleep {seconds}s"),
        task_fn(move |ctx: CancellationToken, progress| async move {
            progress.set_total(seconds);
            for _ in 0..seconds {
                tokio::select! {
                    _ = ctx.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(Duration::from_secs(1)) => progress.increment(),
                }
            }
            Ok(())
        }),
    )
}

fn fail(engine: &Engine) -> Result<JobId, EngineError> {
    engine.add(
        "Fail",
        task_fn(|_ctx, _progress| async { Err(TaskError::msg("Intentional failure")) }),
    )
}

fn delete(engine: &Engine, files: &FileManager, path: &str) -> Result<JobId, EngineError> {
    engine.add(
        format!("Deleting {path}"),
        FileOperationTask::new(
            files.clone(),
            vec![FileOperation::Delete { path: path.into() }],
        ),
    )
}
