//! Lock-aware file operations on the media library.
//!
//! Goal:
//! - Deletes and moves never race with a running stream
//! - Streams hold a read lease for as long as they read
//! - Bulk operations run as ordinary jobs with progress
//!
//! Every mutation goes through [`ReadLockManager::exclusive`], which
//! revokes readers of the path (killing their transcoders) before the
//! filesystem call runs.

mod operations;

use std::path::{Component, Path, PathBuf};

use fs_lock::{CancellationToken, LockContext, LockError, ReadLockManager};
use serde::{Deserialize, Serialize};

pub use operations::{FileOperation, FileOperationTask};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl From<StorageError> for actors::TaskError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Io(io) => actors::TaskError::Io(io),
            StorageError::Lock(lock) => actors::TaskError::Lock(lock),
            other => actors::TaskError::msg(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory for relative paths. Absolute paths are used as given.
    pub root: Option<PathBuf>,
}

impl StorageConfig {
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Build a config from environment variables.
    ///
    /// - `STORAGE_ROOT` (optional): base directory for relative paths
    pub fn from_env() -> Self {
        Self {
            root: std::env::var("STORAGE_ROOT")
                .ok()
                .and_then(non_empty)
                .map(PathBuf::from),
        }
    }
}

/// File operations that cooperate with the path lock manager.
#[derive(Clone)]
pub struct FileManager {
    root: Option<PathBuf>,
    locks: ReadLockManager,
}

impl FileManager {
    pub fn new(cfg: StorageConfig, locks: ReadLockManager) -> Self {
        Self {
            root: cfg.root,
            locks,
        }
    }

    pub fn locks(&self) -> &ReadLockManager {
        &self.locks
    }

    /// Resolve `path` against the configured root.
    ///
    /// Empty paths and paths that climb out with `..` are rejected, so every
    /// lock key is a plain absolute or root-relative file path.
    pub fn resolve(&self, path: impl AsRef<Path>) -> Result<PathBuf, StorageError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(StorageError::InvalidPath("path must not be empty".into()));
        }
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(StorageError::InvalidPath(format!(
                "{} contains '..'",
                path.display()
            )));
        }

        Ok(match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        })
    }

    /// Open a file for streaming, holding a read lease until the returned
    /// context is dropped or `ctx` is cancelled.
    pub async fn open(
        &self,
        ctx: &CancellationToken,
        path: impl AsRef<Path>,
    ) -> Result<(LockContext, tokio::fs::File), StorageError> {
        let path = self.resolve(path)?;
        let lease = self.locks.read_lock(ctx, &path).await?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(e, &path))?;
        Ok((lease, file))
    }

    /// Read a whole file under a read lease.
    ///
    /// Fails with [`LockError::Revoked`] if a delete or move claimed the
    /// path while the read was in flight.
    pub async fn read(
        &self,
        ctx: &CancellationToken,
        path: impl AsRef<Path>,
    ) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(path)?;
        let lease = self.locks.read_lock(ctx, &path).await?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| not_found_or_io(e, &path))?;
        lease.check()?;
        Ok(bytes)
    }

    /// Replace a file's contents with sole access to it.
    pub async fn write(&self, path: impl AsRef<Path>, contents: &[u8]) -> Result<(), StorageError> {
        let path = self.resolve(path)?;
        self.locks
            .exclusive(&path, || async {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&path, contents).await?;
                Ok::<(), StorageError>(())
            })
            .await
    }

    /// Delete a file, first stopping everything that streams it.
    pub async fn delete(&self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = self.resolve(path)?;
        self.locks
            .exclusive(&path, || async {
                tokio::fs::remove_file(&path)
                    .await
                    .map_err(|e| not_found_or_io(e, &path))?;
                tracing::info!(path = %path.display(), "Deleted file");
                Ok::<(), StorageError>(())
            })
            .await
    }

    /// Move a file, with sole access to both source and destination.
    pub async fn rename(
        &self,
        from: impl AsRef<Path>,
        to: impl AsRef<Path>,
    ) -> Result<(), StorageError> {
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        if from == to {
            return Ok(());
        }

        let op = || async {
            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::rename(&from, &to)
                .await
                .map_err(|e| not_found_or_io(e, &from))?;
            tracing::info!(from = %from.display(), to = %to.display(), "Moved file");
            Ok::<(), StorageError>(())
        };

        // Claim both paths in a fixed order so opposing moves cannot deadlock.
        let (first, second) = if from < to { (&from, &to) } else { (&to, &from) };
        self.locks
            .exclusive(first, || self.locks.exclusive(second, op))
            .await
    }
}

impl std::fmt::Debug for FileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileManager")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

fn not_found_or_io(e: std::io::Error, path: &Path) -> StorageError {
    if e.kind() == std::io::ErrorKind::NotFound {
        StorageError::NotFound(path.to_path_buf())
    } else {
        StorageError::Io(e)
    }
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use std::io;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use fs_lock::{AttachedProcess, LockConfig};

    use super::*;

    struct StubProcess {
        kills: Arc<AtomicUsize>,
    }

    impl AttachedProcess for StubProcess {
        fn kill(&mut self) -> io::Result<()> {
            self.kills.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn id(&self) -> Option<u32> {
            None
        }
    }

    fn manager(root: &Path) -> FileManager {
        FileManager::new(
            StorageConfig::rooted(root),
            ReadLockManager::new(LockConfig::default()),
        )
    }

    #[tokio::test]
    async fn write_read_delete() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let files = manager(dir.path());
        let ctx = CancellationToken::new();

        files.write("clips/a.mp4", b"frames").await?;
        assert_eq!(files.read(&ctx, "clips/a.mp4").await?, b"frames");

        files.delete("clips/a.mp4").await?;
        assert!(!dir.path().join("clips/a.mp4").exists());
        assert_eq!(files.locks().tracked_paths(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_a_missing_file_reports_not_found() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let files = manager(dir.path());

        let err = files.delete("nope.mp4").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(p) if p.ends_with("nope.mp4")));
        Ok(())
    }

    #[tokio::test]
    async fn delete_kills_streams_and_waits_for_them() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let files = manager(dir.path());
        files.write("x.mp4", b"data").await?;

        let ctx = CancellationToken::new();
        let kills = Arc::new(AtomicUsize::new(0));
        let (lease, _file) = files.open(&ctx, "x.mp4").await?;
        lease.attach_command(StubProcess {
            kills: kills.clone(),
        });

        // The stream notices revocation and releases shortly after.
        let stream = tokio::spawn(async move {
            lease.cancelled().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(lease);
        });

        files.delete("x.mp4").await?;
        assert_eq!(kills.load(Ordering::SeqCst), 1);
        assert!(!dir.path().join("x.mp4").exists());
        stream.await.unwrap();
        Ok(())
    }

    #[tokio::test]
    async fn rename_moves_into_new_directories() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let files = manager(dir.path());
        files.write("in/a.mkv", b"a").await?;

        files.rename("in/a.mkv", "out/nested/a.mkv").await?;
        assert!(!dir.path().join("in/a.mkv").exists());
        assert_eq!(std::fs::read(dir.path().join("out/nested/a.mkv"))?, b"a");
        Ok(())
    }

    #[tokio::test]
    async fn opposing_renames_do_not_deadlock() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let files = manager(dir.path());
        files.write("a", b"a").await?;
        files.write("b", b"b").await?;

        let one = files.clone();
        let two = files.clone();
        let (r1, r2) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(one.rename("a", "b"), two.rename("b", "a"))
        })
        .await
        .expect("renames deadlocked");

        // Either may lose the race and find its source gone.
        assert!(r1.is_ok() || matches!(r1, Err(StorageError::NotFound(_))));
        assert!(r2.is_ok() || matches!(r2, Err(StorageError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn paths_are_validated() {
        let files = manager(Path::new("/library"));
        assert!(matches!(
            files.resolve(""),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            files.resolve("../etc/passwd"),
            Err(StorageError::InvalidPath(_))
        ));
        assert_eq!(
            files.resolve("a/b.mp4").unwrap(),
            PathBuf::from("/library/a/b.mp4")
        );
        assert_eq!(
            files.resolve("/elsewhere/c.mp4").unwrap(),
            PathBuf::from("/elsewhere/c.mp4")
        );
    }
}
