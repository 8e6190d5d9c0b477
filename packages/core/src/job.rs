//! Job domain types for tracked units of background work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Progress;

/// Unique identifier for a job.
///
/// IDs are allocated from a monotonically increasing counter and are never
/// reused within one engine instance. On the wire they travel as decimal
/// strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Parse a job ID from its wire representation.
    pub fn parse(s: &str) -> Result<Self, InvalidJobId> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| InvalidJobId(s.to_string()))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned when a string is not a valid job ID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job id: {0:?}")]
pub struct InvalidJobId(pub String);

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is queued and waiting for a free worker slot.
    #[default]
    Ready,
    /// Job is currently executing.
    Running,
    /// Job completed successfully.
    Finished,
    /// Job was cancelled, before or during execution.
    Cancelled,
    /// Job returned an error or panicked.
    Failed,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Cancelled | JobStatus::Failed
        )
    }

    /// Whether `next` is a legal successor of this status.
    ///
    /// Status only moves forward: `Ready -> Running -> terminal`, with the
    /// shortcut `Ready -> Cancelled` for jobs cancelled while queued.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Ready, JobStatus::Running) => true,
            (JobStatus::Ready, JobStatus::Cancelled) => true,
            (JobStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Get a simple status string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Ready => "ready",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot of a tracked unit of work.
///
/// Records are owned by the dispatcher; everything handed out to callers is
/// a clone, so no caller can mutate a live job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Human-readable description.
    pub description: String,
    /// Current status.
    pub status: JobStatus,
    /// Reported progress. Only meaningful while running.
    pub progress: Progress,
    /// Sub-task log lines, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Error reported by a failed task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the job was added.
    pub add_time: DateTime<Utc>,
    /// When the job started running.
    pub start_time: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub end_time: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new ready job.
    pub fn new(id: JobId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            status: JobStatus::Ready,
            progress: Progress::Indeterminate,
            details: Vec::new(),
            error: None,
            add_time: Utc::now(),
            start_time: None,
            end_time: None,
        }
    }

    /// Move the job to `Running`. Returns false if the job is not ready.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(JobStatus::Running) {
            return false;
        }
        self.status = JobStatus::Running;
        self.start_time = Some(now.max(self.add_time));
        true
    }

    /// Move the job to a terminal status, stamping `end_time`.
    ///
    /// Returns false (and changes nothing) if the job is already terminal or
    /// the transition is otherwise illegal.
    pub fn finish(&mut self, status: JobStatus, now: DateTime<Utc>) -> bool {
        if !status.is_terminal() || !self.status.can_transition_to(status) {
            return false;
        }
        let floor = self.start_time.unwrap_or(self.add_time);
        self.status = status;
        self.end_time = Some(now.max(floor));
        true
    }

    /// Record a task error.
    pub fn fail_with(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> bool {
        if !self.finish(JobStatus::Failed, now) {
            return false;
        }
        let error = error.into();
        self.details.push(error.clone());
        self.error = Some(error);
        true
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock run time, once both ends are known.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_moves_forward_only() {
        let mut job = Job::new(JobId(1), "scan");
        assert!(!job.finish(JobStatus::Finished, Utc::now()));
        assert!(job.start(Utc::now()));
        assert!(!job.start(Utc::now()));
        assert!(job.finish(JobStatus::Finished, Utc::now()));
        assert!(!job.finish(JobStatus::Cancelled, Utc::now()));
        assert_eq!(job.status, JobStatus::Finished);
    }

    #[test]
    fn ready_job_can_be_cancelled() {
        let mut job = Job::new(JobId(2), "generate");
        assert!(job.finish(JobStatus::Cancelled, Utc::now()));
        assert!(job.start_time.is_none());
        assert!(job.end_time.is_some());
        assert!(!job.start(Utc::now()));
    }

    #[test]
    fn end_time_set_once() {
        let mut job = Job::new(JobId(3), "clean");
        job.start(Utc::now());
        assert!(job.fail_with("disk full", Utc::now()));
        let end = job.end_time;
        assert!(!job.finish(JobStatus::Cancelled, Utc::now()));
        assert_eq!(job.end_time, end);
        assert_eq!(job.error.as_deref(), Some("disk full"));
        assert_eq!(job.details, vec!["disk full".to_string()]);
    }

    #[test]
    fn timestamps_are_ordered() {
        let mut job = Job::new(JobId(4), "identify");
        let earlier = job.add_time - chrono::Duration::seconds(5);
        job.start(earlier);
        job.finish(JobStatus::Finished, earlier);
        let start = job.start_time.unwrap();
        let end = job.end_time.unwrap();
        assert!(job.add_time <= start);
        assert!(start <= end);
    }

    #[test]
    fn job_id_wire_form() {
        assert_eq!(JobId::parse("42"), Ok(JobId(42)));
        assert_eq!(JobId(7).to_string(), "7");
        assert!(JobId::parse("abc").is_err());
        assert!(JobId::parse("-1").is_err());
    }
}
