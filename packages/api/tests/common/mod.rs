#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use api::{AttachedProcess, DispatcherConfig, Engine, EngineConfig, EngineError, Job, JobId};
use tokio::time::Instant;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Engine with `parallel` slots, quick progress updates and a retention
/// long enough that finished jobs stay visible for the whole test.
pub async fn engine(parallel: usize) -> Result<Engine, EngineError> {
    engine_with_retention(parallel, Duration::from_secs(30)).await
}

pub async fn engine_with_retention(
    parallel: usize,
    retention: Duration,
) -> Result<Engine, EngineError> {
    let config = EngineConfig {
        jobs: DispatcherConfig::default()
            .with_parallel_tasks(parallel)
            .with_retention(retention)
            .with_update_throttle(Duration::from_millis(10)),
        ..EngineConfig::default()
    };
    Engine::new(config).await
}

/// Poll until the job satisfies `pred`, panicking after [`TIMEOUT`].
pub async fn wait_for_job(engine: &Engine, id: JobId, pred: impl Fn(&Job) -> bool) -> Job {
    let deadline = Instant::now() + TIMEOUT;
    loop {
        if let Some(job) = engine.get_job(id).await.unwrap()
            && pred(&job)
        {
            return job;
        }
        assert!(Instant::now() < deadline, "timed out waiting for job {id}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn wait_terminal(engine: &Engine, id: JobId) -> Job {
    wait_for_job(engine, id, Job::is_terminal).await
}

/// Stand-in for a transcoder process; counts kill requests.
pub struct StubProcess {
    pub kills: Arc<AtomicUsize>,
}

impl StubProcess {
    pub fn new(kills: &Arc<AtomicUsize>) -> Self {
        Self {
            kills: kills.clone(),
        }
    }
}

impl AttachedProcess for StubProcess {
    fn kill(&mut self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        None
    }
}
