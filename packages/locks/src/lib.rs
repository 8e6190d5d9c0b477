//! Path-keyed, revocable read locks for media files.
//!
//! Streaming handlers take a shared lease on a file before serving or
//! transcoding it. Destructive operations (delete, rename, move) request
//! exclusive access, which revokes every outstanding lease on the path,
//! force-kills processes attached to those leases, and waits for the
//! leases to drain before running.
//!
//! # Usage
//!
//! ```ignore
//! let locks = ReadLockManager::new(LockConfig::default());
//!
//! // streaming side
//! let lease = locks.read_lock(&request_token, "/media/x.mp4").await?;
//! lease.attach_command(ffmpeg_child);
//!
//! // maintenance side
//! locks.exclusive("/media/x.mp4", || tokio::fs::remove_file("/media/x.mp4")).await?;
//! ```

mod config;
mod context;
mod error;
mod manager;
mod process;

pub use config::LockConfig;
pub use context::LockContext;
pub use error::LockError;
pub use manager::ReadLockManager;
pub use process::AttachedProcess;

/// Re-export so callers can build lease contexts without a direct dependency.
pub use tokio_util::sync::CancellationToken;
