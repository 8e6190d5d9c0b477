//! Wire representation of job records.

use job_core::{InvalidJobId, Job, JobId};
use serde::{Deserialize, Serialize};

/// A job as returned to API clients.
///
/// IDs travel as decimal strings, timestamps as RFC 3339, and an
/// indeterminate progress is `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDto {
    pub id: String,
    pub status: String,
    pub description: String,
    pub progress: Option<f64>,
    #[serde(default)]
    pub sub_tasks: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub add_time: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl From<&Job> for JobDto {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.to_string(),
            status: job.status.as_str().to_ascii_uppercase(),
            description: job.description.clone(),
            progress: job.progress.as_fraction(),
            sub_tasks: job.details.clone(),
            error: job.error.clone(),
            add_time: job.add_time.to_rfc3339(),
            start_time: job.start_time.map(|t| t.to_rfc3339()),
            end_time: job.end_time.map(|t| t.to_rfc3339()),
        }
    }
}

impl From<Job> for JobDto {
    fn from(job: Job) -> Self {
        Self::from(&job)
    }
}

/// Parse a job ID received from a client.
pub fn parse_job_id(s: &str) -> Result<JobId, InvalidJobId> {
    JobId::parse(s)
}
