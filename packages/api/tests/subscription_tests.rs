#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use api::{CancellationToken, DispatcherConfig, Engine, EngineConfig, Job, JobStatus, task_fn};
use tokio::sync::mpsc::Receiver;

use common::TIMEOUT;

async fn next(rx: &mut Receiver<Job>) -> Job {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("subscription closed early")
}

#[tokio::test]
async fn test_lifecycle_events_arrive_in_order() -> Result<(), Box<dyn Error>> {
    let engine = common::engine_with_retention(1, Duration::from_millis(20)).await?;
    let ctx = CancellationToken::new();
    let mut sub = engine.subscribe(&ctx);

    let id = engine.add(
        "scan",
        task_fn(|_ctx, _progress| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }),
    )?;

    let added = next(&mut sub.new_job).await;
    assert_eq!(added.id, id);
    assert_eq!(added.status, JobStatus::Ready);

    let started = next(&mut sub.updated_job).await;
    assert_eq!(started.status, JobStatus::Running);

    let finished = next(&mut sub.updated_job).await;
    assert_eq!(finished.status, JobStatus::Finished);

    let removed = next(&mut sub.removed_job).await;
    assert_eq!(removed.id, id);
    assert_eq!(removed.status, JobStatus::Finished);
    assert!(sub.updated_job.try_recv().is_err());

    ctx.cancel();
    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_progress_bursts_are_coalesced() -> Result<(), Box<dyn Error>> {
    const REPORTS: u32 = 20;

    let engine = Engine::new(EngineConfig {
        jobs: DispatcherConfig::default()
            .with_parallel_tasks(1)
            .with_update_throttle(Duration::from_millis(200))
            .with_retention(Duration::from_millis(50)),
        ..EngineConfig::default()
    })
    .await?;
    let ctx = CancellationToken::new();
    let mut sub = engine.subscribe(&ctx);

    let id = engine.add(
        "generate",
        task_fn(|_ctx, progress| async move {
            for i in 1..=REPORTS {
                progress.set_percent(f64::from(i) / f64::from(REPORTS));
            }
            // Outlive the throttle window so the deferred update goes out
            // while the job is still running.
            tokio::time::sleep(Duration::from_millis(400)).await;
            Ok(())
        }),
    )?;
    assert_eq!(next(&mut sub.new_job).await.id, id);

    let mut updates = Vec::new();
    loop {
        let job = next(&mut sub.updated_job).await;
        let terminal = job.is_terminal();
        updates.push(job);
        if terminal {
            break;
        }
    }

    // Start event, first report, one deferred flush, terminal event.
    assert!(updates.len() < REPORTS as usize);
    let last_running = updates
        .iter()
        .rev()
        .find(|j| j.status == JobStatus::Running)
        .expect("running updates were delivered");
    assert_eq!(last_running.progress.as_fraction(), Some(1.0));

    let removed = next(&mut sub.removed_job).await;
    assert_eq!(removed.id, id);
    let terminal = updates.iter().filter(|j| j.is_terminal()).count();
    assert_eq!(terminal, 1);
    assert!(sub.updated_job.try_recv().is_err());

    ctx.cancel();
    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_every_subscriber_sees_the_same_events() -> Result<(), Box<dyn Error>> {
    let engine = common::engine(2).await?;
    let ctx = CancellationToken::new();
    let mut first = engine.subscribe(&ctx);
    let mut second = engine.subscribe(&ctx);

    let a = engine.add("a", task_fn(|_ctx, _progress| async { Ok(()) }))?;
    let b = engine.add("b", task_fn(|_ctx, _progress| async { Ok(()) }))?;

    for sub in [&mut first, &mut second] {
        assert_eq!(next(&mut sub.new_job).await.id, a);
        assert_eq!(next(&mut sub.new_job).await.id, b);
    }

    ctx.cancel();
    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_cancelling_the_context_closes_the_subscription() -> Result<(), Box<dyn Error>> {
    let engine = common::engine(1).await?;
    let ctx = CancellationToken::new();
    let mut sub = engine.subscribe(&ctx);

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while engine.subscriber_count().await? != 1 {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    ctx.cancel();
    let closed = tokio::time::timeout(TIMEOUT, sub.new_job.recv()).await?;
    assert!(closed.is_none());
    assert_eq!(engine.subscriber_count().await?, 0);

    engine.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_stop_closes_open_subscriptions() -> Result<(), Box<dyn Error>> {
    let engine = common::engine(1).await?;
    let ctx = CancellationToken::new();
    let mut sub = engine.subscribe(&ctx);

    engine.stop().await;
    let closed = tokio::time::timeout(TIMEOUT, sub.updated_job.recv()).await?;
    assert!(closed.is_none());

    // Subscribing after stop yields channels that are already closed.
    let mut late = engine.subscribe(&ctx);
    assert!(late.new_job.recv().await.is_none());
    Ok(())
}
