#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use api::{CancellationToken, JobStatus, LockError};
use storage::{FileManager, FileOperation, FileOperationTask, StorageConfig};

use common::{StubProcess, TIMEOUT, wait_terminal};

#[tokio::test]
async fn test_concurrent_streams_share_a_path() -> Result<(), Box<dyn Error>> {
    let engine = common::engine(1).await?;
    let ctx = CancellationToken::new();

    let (first, second) = tokio::join!(
        engine.read_lock(&ctx, "/media/x.mp4"),
        engine.read_lock(&ctx, "/media/x.mp4"),
    );
    let (first, second) = (first?, second?);
    assert_eq!(engine.lock_manager().lease_count("/media/x.mp4"), 2);

    drop(first);
    assert_eq!(engine.lock_manager().lease_count("/media/x.mp4"), 1);
    second.cancel();
    assert_eq!(engine.lock_manager().lease_count("/media/x.mp4"), 0);

    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_delete_kills_every_stream_then_proceeds() -> Result<(), Box<dyn Error>> {
    let engine = common::engine(1).await?;
    let kills = Arc::new(AtomicUsize::new(0));
    let ctx = CancellationToken::new();

    let mut streams = Vec::new();
    for _ in 0..2 {
        let lease = engine.read_lock(&ctx, "/media/x.mp4").await?;
        lease.attach_command(StubProcess::new(&kills));
        // Each stream winds down once its transcoder is killed.
        streams.push(tokio::spawn(async move {
            lease.cancelled().await;
            tokio::time::sleep(Duration::from_millis(10)).await;
        }));
    }

    let seen = tokio::time::timeout(
        TIMEOUT,
        engine.exclusive("/media/x.mp4", || async {
            engine.lock_manager().lease_count("/media/x.mp4")
        }),
    )
    .await?;

    assert_eq!(seen, 0);
    assert_eq!(kills.load(Ordering::SeqCst), 2);
    for stream in streams {
        stream.await?;
    }

    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_streams_wait_while_a_delete_is_pending() -> Result<(), Box<dyn Error>> {
    let engine = common::engine(1).await?;
    let ctx = CancellationToken::new();
    let (entered_tx, entered_rx) = tokio::sync::oneshot::channel();
    let (finish_tx, finish_rx) = tokio::sync::oneshot::channel::<()>();

    let holder = engine.clone();
    let exclusive = tokio::spawn(async move {
        holder
            .exclusive("/media/y.mp4", || async move {
                let _ = entered_tx.send(());
                let _ = finish_rx.await;
            })
            .await;
    });
    entered_rx.await?;

    // A new stream gives up when its own context ends.
    let waiter = CancellationToken::new();
    let cancel = waiter.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });
    let err = engine.read_lock(&waiter, "/media/y.mp4").await.unwrap_err();
    assert!(matches!(err, LockError::WaitCancelled { .. }));

    // Once the delete finishes, streams are granted again.
    let _ = finish_tx.send(());
    exclusive.await?;
    let lease = tokio::time::timeout(TIMEOUT, engine.read_lock(&ctx, "/media/y.mp4")).await??;
    assert!(!lease.is_revoked());

    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_delete_job_revokes_streams() -> Result<(), Box<dyn Error>> {
    let engine = common::engine(1).await?;
    let dir = tempfile::tempdir()?;
    let files = FileManager::new(
        StorageConfig::rooted(dir.path()),
        engine.lock_manager().clone(),
    );
    files.write("scene.mp4", b"frames").await?;

    let ctx = CancellationToken::new();
    let kills = Arc::new(AtomicUsize::new(0));
    let (lease, _file) = files.open(&ctx, "scene.mp4").await?;
    lease.attach_command(StubProcess::new(&kills));
    let stream = tokio::spawn(async move {
        lease.cancelled().await;
    });

    let id = engine.add(
        "Deleting 1 file",
        FileOperationTask::new(
            files,
            vec![FileOperation::Delete {
                path: "scene.mp4".into(),
            }],
        ),
    )?;

    let job = wait_terminal(&engine, id).await;
    assert_eq!(job.status, JobStatus::Finished);
    assert_eq!(job.details, vec!["Deleting scene.mp4".to_string()]);
    assert_eq!(kills.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join("scene.mp4").exists());
    stream.await?;

    engine.stop().await;
    Ok(())
}
