//! The engine facade.

use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use actors::{
    ActorRef, CancellationToken, DispatcherMessage, EngineActors, HubMessage, Subscription, Task,
    start_actors,
};
use chrono::Utc;
use fs_lock::{LockContext, LockError, ReadLockManager};
use job_core::{Job, JobId};
use tokio::task::JoinHandle;

use crate::{EngineConfig, EngineError};

struct Inner {
    dispatcher: ActorRef<DispatcherMessage>,
    hub: ActorRef<HubMessage>,
    locks: ReadLockManager,
    shutdown: CancellationToken,
    /// Next job id. Held across the send so ids, add times and mailbox
    /// order agree.
    next_id: Mutex<u64>,
    config: EngineConfig,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if !self.shutdown.is_cancelled() {
            self.shutdown.cancel();
            let _ = self.dispatcher.send_message(DispatcherMessage::Shutdown);
        }
    }
}

/// Job manager and path lock manager behind one handle.
///
/// Cloning is cheap; clones share the same engine. The actors stop when
/// [`stop`](Self::stop) is called or the last clone is dropped.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Start an engine with the given configuration.
    pub async fn new(config: EngineConfig) -> Result<Self, EngineError> {
        tracing::info!(
            parallel_tasks = config.jobs.slots(),
            retention_ms = config.jobs.retention_ms,
            "Initializing job engine..."
        );

        let shutdown = CancellationToken::new();
        let EngineActors {
            dispatcher,
            hub,
            handles,
        } = start_actors(config.jobs.clone(), shutdown.clone()).await?;

        tracing::info!("Job engine initialized");
        Ok(Self {
            inner: Arc::new(Inner {
                dispatcher,
                hub,
                locks: ReadLockManager::new(config.locks.clone()),
                shutdown,
                next_id: Mutex::new(1),
                config,
                handles: Mutex::new(handles),
            }),
        })
    }

    /// Start an engine configured from the environment.
    pub async fn from_env() -> Result<Self, EngineError> {
        Self::new(EngineConfig::from_env()?).await
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    fn submit(
        &self,
        description: String,
        task: impl Task,
        immediate: bool,
    ) -> Result<JobId, EngineError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::stopped());
        }
        let mut next_id = self
            .inner
            .next_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let job_id = JobId(*next_id);
        self.inner
            .dispatcher
            .send_message(DispatcherMessage::Add {
                job_id,
                description,
                add_time: Utc::now(),
                task: Arc::new(task),
                immediate,
            })
            .map_err(|_| EngineError::stopped())?;
        *next_id += 1;
        Ok(job_id)
    }

    /// Queue a job. It runs once a worker slot is free, in submission order.
    ///
    /// Returns as soon as the job is registered. The job is not tied to the
    /// caller's lifetime; only [`cancel_job`](Self::cancel_job) or shutdown
    /// stops it.
    pub fn add(&self, description: impl Into<String>, task: impl Task) -> Result<JobId, EngineError> {
        self.submit(description.into(), task, false)
    }

    /// Run a job right away, without waiting for a worker slot.
    pub fn start(
        &self,
        description: impl Into<String>,
        task: impl Task,
    ) -> Result<JobId, EngineError> {
        self.submit(description.into(), task, true)
    }

    /// Request cancellation of a job. Unknown and finished jobs are ignored.
    pub fn cancel_job(&self, job_id: JobId) {
        if self
            .inner
            .dispatcher
            .send_message(DispatcherMessage::CancelJob { job_id })
            .is_err()
        {
            tracing::debug!(%job_id, "Engine stopped, ignoring cancel");
        }
    }

    /// Request cancellation of every unfinished job.
    pub fn cancel_all(&self) {
        if self
            .inner
            .dispatcher
            .send_message(DispatcherMessage::CancelAll)
            .is_err()
        {
            tracing::debug!("Engine stopped, ignoring cancel all");
        }
    }

    /// Snapshot of every job still in the registry, oldest first.
    pub async fn get_queue(&self) -> Result<Vec<Job>, EngineError> {
        let (tx, rx) = actors::concurrency::oneshot();
        self.inner
            .dispatcher
            .send_message(DispatcherMessage::GetQueue { reply: tx.into() })
            .map_err(|e| EngineError::Actor(format!("Failed to send message: {}", e)))?;

        rx.await
            .map_err(|_| EngineError::Actor("Failed to receive response".into()))
    }

    /// Look up a job, including recently evicted ones.
    pub async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, EngineError> {
        let (tx, rx) = actors::concurrency::oneshot();
        self.inner
            .dispatcher
            .send_message(DispatcherMessage::GetJob {
                job_id,
                reply: tx.into(),
            })
            .map_err(|e| EngineError::Actor(format!("Failed to send message: {}", e)))?;

        rx.await
            .map_err(|_| EngineError::Actor("Failed to receive response".into()))
    }

    /// Receive lifecycle events until `ctx` is cancelled.
    ///
    /// Every subscriber sees events in the same order. A subscriber that
    /// falls behind by more than the configured buffer misses events
    /// rather than stalling the engine. If the engine has stopped, the
    /// returned channels are already closed.
    pub fn subscribe(&self, ctx: &CancellationToken) -> Subscription {
        let (subscriber, subscription) =
            Subscription::channel(self.inner.config.jobs.buffer());
        if self
            .inner
            .hub
            .send_message(HubMessage::Subscribe {
                subscriber,
                ctx: ctx.clone(),
            })
            .is_err()
        {
            tracing::debug!("Engine stopped, subscription closed immediately");
        }
        subscription
    }

    /// Number of live subscribers.
    pub async fn subscriber_count(&self) -> Result<usize, EngineError> {
        let (tx, rx) = actors::concurrency::oneshot();
        self.inner
            .hub
            .send_message(HubMessage::Count { reply: tx.into() })
            .map_err(|e| EngineError::Actor(format!("Failed to send message: {}", e)))?;

        rx.await
            .map_err(|_| EngineError::Actor("Failed to receive response".into()))
    }

    /// The path lock manager shared by streaming and file operations.
    pub fn lock_manager(&self) -> &ReadLockManager {
        &self.inner.locks
    }

    /// Take a shared lease on `path` for as long as `ctx` lives.
    pub async fn read_lock(
        &self,
        ctx: &CancellationToken,
        path: impl AsRef<Path>,
    ) -> Result<LockContext, LockError> {
        self.inner.locks.read_lock(ctx, path).await
    }

    /// Run `op` with sole ownership of `path`, revoking any readers first.
    pub async fn exclusive<F, Fut, T>(&self, path: impl AsRef<Path>, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.inner.locks.exclusive(path, op).await
    }

    /// Revoke every lease on `path` without waiting.
    pub fn cancel_path(&self, path: impl AsRef<Path>) {
        self.inner.locks.cancel(path);
    }

    /// Cancel all jobs, close subscriptions and wait for the actors to stop.
    ///
    /// Calling this more than once is harmless.
    pub async fn stop(&self) {
        if !self.inner.shutdown.is_cancelled() {
            tracing::info!("Stopping job engine");
            self.inner.shutdown.cancel();
            let _ = self
                .inner
                .dispatcher
                .send_message(DispatcherMessage::Shutdown);
        }

        let handles = std::mem::take(
            &mut *self
                .inner
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Engine actor ended abnormally: {}", e);
            }
        }
    }

    /// Whether [`stop`](Self::stop) has been requested.
    pub fn is_stopped(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
