//! Standalone job engine process.
//!
//! Starts an engine configured from the environment, submits the demo jobs
//! named on the command line, and logs every lifecycle event until Ctrl-C.
//!
//! ```text
//! jobd echo:hello sleep:3 fail delete:/library/old.mp4
//! ```

use api::{CancellationToken, Engine, JobDto, Subscription};
use storage::{FileManager, StorageConfig};
use tracing_subscriber::EnvFilter;

mod demo;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let engine = Engine::from_env().await?;
    let files = FileManager::new(StorageConfig::from_env(), engine.lock_manager().clone());

    let ctx = CancellationToken::new();
    let events = tokio::spawn(log_events(engine.subscribe(&ctx)));

    let args: Vec<String> = std::env::args().skip(1).collect();
    for id in demo::submit(&engine, &files, &args)? {
        tracing::info!(job_id = %id, "Submitted demo job");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupted, shutting down");

    engine.stop().await;
    ctx.cancel();
    events.await?;
    Ok(())
}

async fn log_events(mut sub: Subscription) {
    loop {
        let (kind, job) = tokio::select! {
            Some(job) = sub.new_job.recv() => ("new", job),
            Some(job) = sub.updated_job.recv() => ("updated", job),
            Some(job) = sub.removed_job.recv() => ("removed", job),
            else => break,
        };
        match serde_json::to_string(&JobDto::from(&job)) {
            Ok(json) => tracing::info!(kind, "{}", json),
            Err(e) => tracing::warn!(kind, job_id = %job.id, "Failed to encode job: {}", e),
        }
    }
    tracing::debug!("Event stream closed");
}
