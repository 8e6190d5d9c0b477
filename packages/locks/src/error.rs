//! Lock error types.

use std::path::PathBuf;

/// Errors returned to lease holders.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// The caller's context ended before a lease was granted.
    #[error("wait for read lock on {} was cancelled", path.display())]
    WaitCancelled { path: PathBuf },

    /// An exclusive request revoked the lease; the holder must stop.
    #[error("read lock on {} was revoked", path.display())]
    Revoked { path: PathBuf },
}

impl LockError {
    /// Whether the caller should treat this as "try later" rather than a
    /// hard failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::WaitCancelled { .. } | LockError::Revoked { .. })
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            LockError::WaitCancelled { path } | LockError::Revoked { path } => path,
        }
    }
}
