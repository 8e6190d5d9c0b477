//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Lifecycle events emitted by the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was added.
    NewJob { job: Job, timestamp: DateTime<Utc> },
    /// A job started, reported progress, or reached a terminal status.
    UpdatedJob { job: Job, timestamp: DateTime<Utc> },
    /// A terminal job was evicted from the active registry.
    RemovedJob { job: Job, timestamp: DateTime<Utc> },
}

/// Discriminant of a [`JobEvent`], used to route it to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobEventKind {
    New,
    Updated,
    Removed,
}

impl JobEvent {
    pub fn new_job(job: Job) -> Self {
        JobEvent::NewJob {
            job,
            timestamp: Utc::now(),
        }
    }

    pub fn updated(job: Job) -> Self {
        JobEvent::UpdatedJob {
            job,
            timestamp: Utc::now(),
        }
    }

    pub fn removed(job: Job) -> Self {
        JobEvent::RemovedJob {
            job,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> JobEventKind {
        match self {
            JobEvent::NewJob { .. } => JobEventKind::New,
            JobEvent::UpdatedJob { .. } => JobEventKind::Updated,
            JobEvent::RemovedJob { .. } => JobEventKind::Removed,
        }
    }

    /// Get the job snapshot carried by the event.
    pub fn job(&self) -> &Job {
        match self {
            JobEvent::NewJob { job, .. }
            | JobEvent::UpdatedJob { job, .. }
            | JobEvent::RemovedJob { job, .. } => job,
        }
    }

    pub fn into_job(self) -> Job {
        match self {
            JobEvent::NewJob { job, .. }
            | JobEvent::UpdatedJob { job, .. }
            | JobEvent::RemovedJob { job, .. } => job,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job().id
    }

    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::NewJob { timestamp, .. }
            | JobEvent::UpdatedJob { timestamp, .. }
            | JobEvent::RemovedJob { timestamp, .. } => *timestamp,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::NewJob { job, .. } => {
                format!("Job {} added: {}", job.id, job.description)
            }
            JobEvent::UpdatedJob { job, .. } => match job.progress.as_fraction() {
                Some(fraction) if !job.is_terminal() => {
                    format!("Job {} {} ({:.0}%)", job.id, job.status, fraction * 100.0)
                }
                _ => format!("Job {} -> {}", job.id, job.status),
            },
            JobEvent::RemovedJob { job, .. } => format!("Job {} removed", job.id),
        }
    }
}
