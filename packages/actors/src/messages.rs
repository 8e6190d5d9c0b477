//! Message types for actor communication.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use job_core::{Job, JobEvent, JobId, Progress};
use ractor::RpcReplyPort;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Task;

/// How a task's future ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The task returned `Ok`.
    Completed,
    /// The task returned an error.
    Errored(String),
    /// The task panicked; the panic was contained.
    Panicked { message: String, backtrace: String },
}

/// Messages for the DispatcherActor.
#[derive(Debug)]
pub enum DispatcherMessage {
    /// Register a new job. Queued jobs wait for a free slot; `immediate`
    /// jobs start right away, outside the slot limit. `add_time` is taken
    /// when the id is allocated so both follow submission order.
    Add {
        job_id: JobId,
        description: String,
        add_time: DateTime<Utc>,
        task: Arc<dyn Task>,
        immediate: bool,
    },

    /// Cancel a job. Unknown or finished jobs are ignored.
    CancelJob { job_id: JobId },

    /// Cancel every job that has not finished.
    CancelAll,

    /// Get a job by ID, including recently evicted ones.
    GetJob {
        job_id: JobId,
        reply: RpcReplyPort<Option<Job>>,
    },

    /// Snapshot of the active registry, oldest first.
    GetQueue { reply: RpcReplyPort<Vec<Job>> },

    /// Progress report from a running task.
    Progress { job_id: JobId, progress: Progress },

    /// Detail line from a running task.
    Detail { job_id: JobId, line: String },

    /// Deferred emission of a throttled progress update.
    FlushUpdate { job_id: JobId },

    /// A task's future has returned (or panicked).
    TaskReturned {
        job_id: JobId,
        outcome: TaskOutcome,
        /// Whether the job held one of the bounded worker slots.
        counted: bool,
    },

    /// Drop a terminal job from the active registry.
    Evict { job_id: JobId },

    /// Cancel everything and stop.
    Shutdown,
}

/// Sending halves of one subscriber's channels.
#[derive(Debug)]
pub struct Subscriber {
    pub new_job: mpsc::Sender<Job>,
    pub updated_job: mpsc::Sender<Job>,
    pub removed_job: mpsc::Sender<Job>,
}

/// Messages for the HubActor.
#[derive(Debug)]
pub enum HubMessage {
    /// Register a subscriber until `ctx` is cancelled.
    Subscribe {
        subscriber: Subscriber,
        ctx: CancellationToken,
    },

    /// Remove a subscriber, closing its channels.
    Unsubscribe { id: u64 },

    /// Deliver an event to every subscriber.
    Publish(JobEvent),

    /// Number of live subscribers.
    Count { reply: RpcReplyPort<usize> },

    /// Close all channels and stop, after earlier events are delivered.
    Shutdown,
}
