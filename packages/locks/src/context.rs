//! The handle a lease holder keeps while reading a file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::manager::Inner;
use crate::{AttachedProcess, LockError};

/// A granted shared lease on one path.
///
/// The lease ends when [`cancel`](Self::cancel) is called, when the context
/// is dropped, or when the caller's token passed to
/// [`ReadLockManager::read_lock`](crate::ReadLockManager::read_lock) is
/// cancelled. An exclusive request revokes the lease: [`token`](Self::token)
/// is cancelled and the holder should stop at its next I/O boundary.
pub struct LockContext {
    inner: Arc<Inner>,
    path: PathBuf,
    lease: u64,
    token: CancellationToken,
    released: CancellationToken,
}

impl LockContext {
    pub(crate) fn new(
        inner: Arc<Inner>,
        path: PathBuf,
        lease: u64,
        token: CancellationToken,
        caller: CancellationToken,
    ) -> Self {
        let released = CancellationToken::new();

        // Release on caller disconnect even if nobody calls cancel().
        {
            let inner = inner.clone();
            let path = path.clone();
            let released = released.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = caller.cancelled() => {
                        released.cancel();
                        inner.release(&path, lease);
                    }
                    _ = released.cancelled() => {}
                }
            });
        }

        Self {
            inner,
            path,
            lease,
            token,
            released,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Token cancelled when the lease ends or is revoked. Pass it to the
    /// work being done under the lease.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Resolves once the lease is revoked or released.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn is_revoked(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Check the lease at an I/O boundary.
    pub fn check(&self) -> Result<(), LockError> {
        if self.token.is_cancelled() {
            Err(LockError::Revoked {
                path: self.path.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Register a process to be force-killed if the lease is revoked.
    ///
    /// The process is killed immediately if the lease has already been
    /// revoked or released.
    pub fn attach_command(&self, process: impl AttachedProcess) {
        self.inner.attach(&self.path, self.lease, Box::new(process));
    }

    /// Release the lease. Safe to call more than once.
    pub fn cancel(&self) {
        if self.released.is_cancelled() {
            return;
        }
        self.released.cancel();
        self.token.cancel();
        self.inner.release(&self.path, self.lease);
    }
}

impl Drop for LockContext {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for LockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockContext")
            .field("path", &self.path)
            .field("lease", &self.lease)
            .field("revoked", &self.token.is_cancelled())
            .finish()
    }
}
