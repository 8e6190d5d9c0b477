//! External processes that can be attached to a lease.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

/// A live external process (typically a transcoder) that must be
/// force-terminated when the lease it serves is revoked.
///
/// OS processes do not observe cancellation tokens, so revocation kills
/// them directly.
pub trait AttachedProcess: Send + 'static {
    /// Send a kill signal. Must not block waiting for the process to exit.
    fn kill(&mut self) -> io::Result<()>;

    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;
}

impl AttachedProcess for tokio::process::Child {
    fn kill(&mut self) -> io::Result<()> {
        self.start_kill()
    }

    fn id(&self) -> Option<u32> {
        tokio::process::Child::id(self)
    }
}

impl AttachedProcess for std::process::Child {
    fn kill(&mut self) -> io::Result<()> {
        std::process::Child::kill(self)
    }

    fn id(&self) -> Option<u32> {
        Some(std::process::Child::id(self))
    }
}

/// Shared handle, for when the streaming side keeps using the process
/// (reading its stdout) after attaching it.
impl<P: AttachedProcess> AttachedProcess for Arc<Mutex<P>> {
    fn kill(&mut self) -> io::Result<()> {
        self.lock().unwrap_or_else(PoisonError::into_inner).kill()
    }

    fn id(&self) -> Option<u32> {
        self.lock().unwrap_or_else(PoisonError::into_inner).id()
    }
}

/// Kill a process, logging instead of failing.
pub(crate) fn kill_logged(path: &std::path::Path, process: &mut dyn AttachedProcess) {
    let pid = process.id();
    match process.kill() {
        Ok(()) => tracing::info!(path = %path.display(), ?pid, "Killed process attached to revoked lease"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            ?pid,
            error = %e,
            "Failed to kill process attached to revoked lease"
        ),
    }
}
