//! Actor system for the job engine.
//!
//! This crate provides the Ractor-based actors that own all job state:
//!
//! # Architecture
//!
//! - `DispatcherActor` - FIFO queue, bounded worker slots, job lifecycle
//! - `HubActor` - fans lifecycle events out to subscribers, in order
//! - `Task` - the unit of work a job runs, with a `ProgressReporter`
//!
//! # Usage
//!
//! ```ignore
//! use actors::{DispatcherConfig, DispatcherMessage, start_actors};
//!
//! let actors = start_actors(DispatcherConfig::default(), CancellationToken::new()).await?;
//! actors.dispatcher.send_message(DispatcherMessage::Add { ... })?;
//! ```

mod config;
mod dispatcher;
mod hub;
mod messages;
mod panic;
mod progress;
mod supervisor;
mod task;

pub use config::{DispatcherConfig, default_parallel_tasks};
pub use dispatcher::DispatcherActor;
pub use hub::{HubActor, Subscription};
pub use messages::{DispatcherMessage, HubMessage, Subscriber, TaskOutcome};
pub use progress::ProgressReporter;
pub use supervisor::{EngineActors, start_actors};
pub use task::{FnTask, Task, TaskError, TaskFuture, TaskResult, task_fn};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, SpawnErr, concurrency};
pub use tokio_util::sync::CancellationToken;
