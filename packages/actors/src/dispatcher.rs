//! Dispatcher actor: the FIFO job queue and its bounded worker slots.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use job_core::{Job, JobEvent, JobId, JobStatus};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::DispatcherConfig;
use crate::messages::{DispatcherMessage, HubMessage, TaskOutcome};
use crate::panic::run_guarded;
use crate::{ProgressReporter, Task};

/// Registry entry: the job record plus what the dispatcher needs to run it.
struct Entry {
    job: Job,
    task: Option<Arc<dyn Task>>,
    cancel: CancellationToken,
    last_update: Option<Instant>,
    flush_pending: bool,
}

/// Arguments for the dispatcher actor.
pub struct DispatcherArgs {
    pub config: DispatcherConfig,
    pub hub: ActorRef<HubMessage>,
    /// Engine-wide shutdown token; every job token is a child of it.
    pub shutdown: CancellationToken,
}

/// State for the dispatcher actor.
pub struct DispatcherState {
    config: DispatcherConfig,
    hub: ActorRef<HubMessage>,
    shutdown: CancellationToken,
    /// Active registry: queued, running and recently finished jobs.
    entries: HashMap<JobId, Entry>,
    /// Ready jobs in arrival order.
    pending: VecDeque<JobId>,
    /// Tasks currently holding a worker slot.
    running: usize,
    /// Recently evicted jobs, oldest first.
    graveyard: VecDeque<Job>,
}

fn publish(hub: &ActorRef<HubMessage>, event: JobEvent) {
    if hub.send_message(HubMessage::Publish(event)).is_err() {
        tracing::debug!("Subscription hub gone, dropping event");
    }
}

impl DispatcherState {
    fn new(args: DispatcherArgs) -> Self {
        Self {
            config: args.config,
            hub: args.hub,
            shutdown: args.shutdown,
            entries: HashMap::new(),
            pending: VecDeque::new(),
            running: 0,
            graveyard: VecDeque::new(),
        }
    }

    fn add(
        &mut self,
        myself: &ActorRef<DispatcherMessage>,
        job: Job,
        task: Arc<dyn Task>,
        immediate: bool,
    ) {
        let job_id = job.id;
        tracing::info!(job_id = %job_id, description = %job.description, "Job added");
        publish(&self.hub, JobEvent::new_job(job.clone()));

        self.entries.insert(
            job_id,
            Entry {
                job,
                task: Some(task),
                cancel: self.shutdown.child_token(),
                last_update: None,
                flush_pending: false,
            },
        );

        if immediate {
            self.start_job(myself, job_id, false);
        } else {
            self.pending.push_back(job_id);
            self.pump(myself);
        }
    }

    /// Start queued jobs while worker slots are free.
    fn pump(&mut self, myself: &ActorRef<DispatcherMessage>) {
        if self.shutdown.is_cancelled() {
            while let Some(job_id) = self.pending.pop_front() {
                self.cancel(myself, job_id);
            }
            return;
        }

        while self.running < self.config.slots() {
            let Some(job_id) = self.pending.pop_front() else {
                break;
            };
            if self
                .entries
                .get(&job_id)
                .is_some_and(|e| e.job.status == JobStatus::Ready)
            {
                self.start_job(myself, job_id, true);
            }
        }
    }

    fn start_job(&mut self, myself: &ActorRef<DispatcherMessage>, job_id: JobId, counted: bool) {
        let Some(entry) = self.entries.get_mut(&job_id) else {
            return;
        };
        let Some(task) = entry.task.take() else {
            return;
        };
        if !entry.job.start(Utc::now()) {
            return;
        }
        if counted {
            self.running += 1;
        }

        tracing::info!(job_id = %job_id, description = %entry.job.description, "Job started");
        publish(&self.hub, JobEvent::updated(entry.job.clone()));

        let ctx = entry.cancel.clone();
        let progress = ProgressReporter::new(job_id, myself.clone());
        let myself = myself.clone();
        tokio::spawn(async move {
            let outcome = run_guarded(async move { task.execute(ctx, progress).await }).await;
            if let TaskOutcome::Panicked { message, backtrace } = &outcome {
                tracing::error!(job_id = %job_id, panic = %message, "Task panicked\n{backtrace}");
            }
            let returned = DispatcherMessage::TaskReturned {
                job_id,
                outcome,
                counted,
            };
            if myself.send_message(returned).is_err() {
                tracing::debug!(job_id = %job_id, "Dispatcher stopped before task returned");
            }
        });
    }

    fn task_returned(
        &mut self,
        myself: &ActorRef<DispatcherMessage>,
        job_id: JobId,
        outcome: TaskOutcome,
        counted: bool,
    ) {
        if counted {
            self.running = self.running.saturating_sub(1);
        }

        if let Some(entry) = self.entries.get_mut(&job_id)
            && !entry.job.is_terminal()
        {
            let now = Utc::now();
            if entry.cancel.is_cancelled() {
                entry.job.finish(JobStatus::Cancelled, now);
                tracing::info!(job_id = %job_id, "Job cancelled");
            } else {
                match outcome {
                    TaskOutcome::Completed => {
                        entry.job.finish(JobStatus::Finished, now);
                        tracing::info!(
                            job_id = %job_id,
                            duration_ms = entry.job.duration_ms().unwrap_or_default(),
                            "Job finished"
                        );
                    }
                    TaskOutcome::Errored(error) => {
                        tracing::error!(job_id = %job_id, error = %error, "Task failed due to error");
                        entry.job.fail_with(error, now);
                    }
                    TaskOutcome::Panicked { message, .. } => {
                        entry.job.fail_with(format!("panic: {message}"), now);
                    }
                }
            }
            publish(&self.hub, JobEvent::updated(entry.job.clone()));
            self.schedule_evict(myself, job_id);
        } else {
            tracing::debug!(job_id = %job_id, "Task returned after job was finalised");
        }

        self.pump(myself);
    }

    /// Cancel a job. Silent no-op for unknown or terminal jobs.
    fn cancel(&mut self, myself: &ActorRef<DispatcherMessage>, job_id: JobId) {
        let Some(entry) = self.entries.get_mut(&job_id) else {
            return;
        };
        if entry.job.is_terminal() {
            return;
        }

        entry.cancel.cancel();
        let was_ready = entry.job.status == JobStatus::Ready;
        if !entry.job.finish(JobStatus::Cancelled, Utc::now()) {
            return;
        }
        if was_ready {
            entry.task = None;
            self.pending.retain(|id| *id != job_id);
        }

        tracing::info!(job_id = %job_id, was_ready, "Job cancelled");
        publish(&self.hub, JobEvent::updated(entry.job.clone()));
        self.schedule_evict(myself, job_id);
    }

    fn cancel_all(&mut self, myself: &ActorRef<DispatcherMessage>) {
        let mut ids: Vec<JobId> = self
            .entries
            .values()
            .filter(|e| !e.job.is_terminal())
            .map(|e| e.job.id)
            .collect();
        ids.sort();
        for job_id in ids {
            self.cancel(myself, job_id);
        }
    }

    /// Emit a progress update now, or defer it if one went out recently.
    fn report(&mut self, myself: &ActorRef<DispatcherMessage>, job_id: JobId) {
        let throttle = self.config.update_throttle();
        let Some(entry) = self.entries.get_mut(&job_id) else {
            return;
        };

        let now = Instant::now();
        match entry.last_update {
            Some(last) if now.duration_since(last) < throttle => {
                if !entry.flush_pending {
                    entry.flush_pending = true;
                    let delay = throttle - now.duration_since(last);
                    let myself = myself.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = myself.send_message(DispatcherMessage::FlushUpdate { job_id });
                    });
                }
            }
            _ => {
                entry.last_update = Some(now);
                publish(&self.hub, JobEvent::updated(entry.job.clone()));
            }
        }
    }

    fn flush(&mut self, job_id: JobId) {
        let Some(entry) = self.entries.get_mut(&job_id) else {
            return;
        };
        if !entry.flush_pending {
            return;
        }
        entry.flush_pending = false;
        // Terminal jobs already announced their final state.
        if entry.job.status == JobStatus::Running {
            entry.last_update = Some(Instant::now());
            publish(&self.hub, JobEvent::updated(entry.job.clone()));
        }
    }

    fn schedule_evict(&self, myself: &ActorRef<DispatcherMessage>, job_id: JobId) {
        let retention = self.config.retention();
        let myself = myself.clone();
        if retention.is_zero() {
            let _ = myself.send_message(DispatcherMessage::Evict { job_id });
            return;
        }
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            let _ = myself.send_message(DispatcherMessage::Evict { job_id });
        });
    }

    fn evict(&mut self, job_id: JobId) {
        let Some(entry) = self.entries.remove(&job_id) else {
            return;
        };
        let job = entry.job;
        publish(&self.hub, JobEvent::removed(job.clone()));

        if self.config.graveyard_size > 0 {
            self.graveyard.push_back(job);
            while self.graveyard.len() > self.config.graveyard_size {
                self.graveyard.pop_front();
            }
        }
    }

    fn get_job(&self, job_id: JobId) -> Option<Job> {
        self.entries
            .get(&job_id)
            .map(|e| e.job.clone())
            .or_else(|| self.graveyard.iter().rev().find(|j| j.id == job_id).cloned())
    }

    fn queue(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.entries.values().map(|e| e.job.clone()).collect();
        jobs.sort_by(|a, b| a.add_time.cmp(&b.add_time).then(a.id.cmp(&b.id)));
        jobs
    }
}

/// Dispatcher actor. Its mailbox is the single dispatcher loop, and the
/// only place job records are mutated.
pub struct DispatcherActor;

impl Actor for DispatcherActor {
    type Msg = DispatcherMessage;
    type State = DispatcherState;
    type Arguments = DispatcherArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            parallel_tasks = args.config.slots(),
            "Starting job dispatcher"
        );
        Ok(DispatcherState::new(args))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            DispatcherMessage::Add {
                job_id,
                description,
                add_time,
                task,
                immediate,
            } => {
                let mut job = Job::new(job_id, description);
                job.add_time = add_time;
                state.add(&myself, job, task, immediate);
            }

            DispatcherMessage::CancelJob { job_id } => {
                state.cancel(&myself, job_id);
            }

            DispatcherMessage::CancelAll => {
                state.cancel_all(&myself);
            }

            DispatcherMessage::GetJob { job_id, reply } => {
                let _ = reply.send(state.get_job(job_id));
            }

            DispatcherMessage::GetQueue { reply } => {
                let _ = reply.send(state.queue());
            }

            DispatcherMessage::Progress { job_id, progress } => {
                if let Some(entry) = state.entries.get_mut(&job_id)
                    && entry.job.status == JobStatus::Running
                {
                    entry.job.progress = progress;
                    state.report(&myself, job_id);
                }
            }

            DispatcherMessage::Detail { job_id, line } => {
                if let Some(entry) = state.entries.get_mut(&job_id)
                    && entry.job.status == JobStatus::Running
                {
                    entry.job.details.push(line);
                    state.report(&myself, job_id);
                }
            }

            DispatcherMessage::FlushUpdate { job_id } => {
                state.flush(job_id);
            }

            DispatcherMessage::TaskReturned {
                job_id,
                outcome,
                counted,
            } => {
                state.task_returned(&myself, job_id, outcome, counted);
            }

            DispatcherMessage::Evict { job_id } => {
                state.evict(job_id);
            }

            DispatcherMessage::Shutdown => {
                tracing::info!(
                    jobs = state.entries.len(),
                    running = state.running,
                    "Shutting down job dispatcher"
                );
                state.cancel_all(&myself);
                state.shutdown.cancel();
                let _ = state.hub.send_message(HubMessage::Shutdown);
                myself.stop(None);
                return Ok(());
            }
        }

        Ok(())
    }
}
