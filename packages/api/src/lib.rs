//! Public facade of the job engine.
//!
//! This crate is what the GraphQL resolvers and HTTP routes talk to:
//! - Job control (add, start, cancel, cancel all, queue, job lookup)
//! - Lifecycle subscriptions
//! - Read locks for streaming, exclusive access for file operations
//! - Wire conversions for job records
//!
//! The engine is constructed explicitly and passed to whoever needs it;
//! there is no process-wide instance.

mod config;
mod dto;
mod engine;
mod error;

pub use config::{ConfigError, EngineConfig};
pub use dto::{JobDto, parse_job_id};
pub use engine::Engine;
pub use error::EngineError;

// Re-export core types for convenience
pub use actors::{
    CancellationToken, DispatcherConfig, ProgressReporter, Subscription, Task, TaskError,
    TaskFuture, TaskResult, task_fn,
};
pub use fs_lock::{AttachedProcess, LockConfig, LockContext, LockError, ReadLockManager};
pub use job_core::{Job, JobEvent, JobId, JobStatus, Progress};
