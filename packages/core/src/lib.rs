//! Core domain types for the background job engine.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobId and JobStatus for tracked units of work
//! - Progress for the reported completion of a running job
//! - Events for real-time lifecycle updates

mod events;
mod job;
mod progress;

pub use events::{JobEvent, JobEventKind};
pub use job::{InvalidJobId, Job, JobId, JobStatus};
pub use progress::Progress;
