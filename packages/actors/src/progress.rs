//! Progress reporting handed to running tasks.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use job_core::{JobId, Progress};
use ractor::ActorRef;

use crate::messages::DispatcherMessage;

#[derive(Debug, Default)]
struct Counts {
    total: u64,
    processed: u64,
}

/// Lets a task report how far along it is.
///
/// Reports are fire-and-forget messages to the dispatcher, which coalesces
/// bursts before notifying subscribers. Cloning shares the counters, so
/// subtasks running concurrently can all `increment` the same job.
#[derive(Clone)]
pub struct ProgressReporter {
    job_id: JobId,
    dispatcher: Option<ActorRef<DispatcherMessage>>,
    counts: Arc<Mutex<Counts>>,
}

impl ProgressReporter {
    pub(crate) fn new(job_id: JobId, dispatcher: ActorRef<DispatcherMessage>) -> Self {
        Self {
            job_id,
            dispatcher: Some(dispatcher),
            counts: Arc::default(),
        }
    }

    /// A reporter that goes nowhere, for running a task outside the engine.
    pub fn detached(job_id: JobId) -> Self {
        Self {
            job_id,
            dispatcher: None,
            counts: Arc::default(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    fn send(&self, message: DispatcherMessage) {
        if let Some(dispatcher) = &self.dispatcher
            && dispatcher.send_message(message).is_err()
        {
            tracing::debug!(job_id = %self.job_id, "Dispatcher gone, dropping progress report");
        }
    }

    fn update_counts(&self, f: impl FnOnce(&mut Counts)) {
        let progress = {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut counts);
            Progress::from_counts(counts.processed, counts.total)
        };
        self.report(progress);
    }

    fn report(&self, progress: Progress) {
        self.send(DispatcherMessage::Progress {
            job_id: self.job_id,
            progress,
        });
    }

    /// Set the number of work items.
    pub fn set_total(&self, total: u64) {
        self.update_counts(|c| c.total = total);
    }

    /// Grow the number of work items, e.g. when a scan discovers more files.
    pub fn add_total(&self, more: u64) {
        self.update_counts(|c| c.total = c.total.saturating_add(more));
    }

    pub fn set_processed(&self, processed: u64) {
        self.update_counts(|c| c.processed = processed);
    }

    /// Mark one more work item as done. Never exceeds the total.
    pub fn increment(&self) {
        self.update_counts(|c| {
            if c.processed < c.total {
                c.processed += 1;
            }
        });
    }

    /// Report a fraction directly, bypassing the counters.
    pub fn set_percent(&self, fraction: f64) {
        self.report(Progress::fraction(fraction));
    }

    /// Report that the amount of remaining work is unknown.
    pub fn indefinite(&self) {
        self.report(Progress::Indeterminate);
    }

    /// Append a line to the job's details.
    pub fn add_detail(&self, line: impl Into<String>) {
        self.send(DispatcherMessage::Detail {
            job_id: self.job_id,
            line: line.into(),
        });
    }

    /// Run a named sub-step, logging it in the job's details first.
    pub async fn execute_subtask<F>(&self, description: impl Into<String>, fut: F) -> F::Output
    where
        F: Future,
    {
        self.add_detail(description);
        fut.await
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("job_id", &self.job_id)
            .field("attached", &self.dispatcher.is_some())
            .finish()
    }
}
