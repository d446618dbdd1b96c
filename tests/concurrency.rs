//! Worker pool bounds and shutdown behavior under load

mod common;

use common::{GatedEngine, PanickingEngine, TitleEngine, settled};
use std::sync::Arc;
use std::time::Duration;
use vidfetch::{Error, Orchestrator, TaskStatus, WorkerPool};

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn never_more_than_capacity_tasks_run_at_once() {
    let dir = tempfile::tempdir().unwrap();
    let engine = GatedEngine::new();
    let orchestrator = Orchestrator::new(Arc::new(engine.clone()), dir.path(), 3);

    let ids: Vec<_> = (0..10)
        .map(|i| {
            orchestrator
                .start_task(&format!("https://example.com/{i}"))
                .unwrap()
        })
        .collect();

    wait_until(|| engine.running() == 3).await;
    // Give the dispatcher a chance to (incorrectly) start a fourth job
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.started(), 3);
    assert_eq!(orchestrator.pool().active(), 3);
    assert_eq!(orchestrator.pool().queued(), 7);

    engine.release(10);
    for id in &ids {
        assert_eq!(settled(&orchestrator, id).await.status, TaskStatus::Completed);
    }

    assert_eq!(engine.started(), 10, "every submitted job ran exactly once");
    assert_eq!(engine.peak(), 3);
}

#[tokio::test]
async fn queued_tasks_are_processing_until_they_start() {
    let dir = tempfile::tempdir().unwrap();
    let engine = GatedEngine::new();
    let orchestrator = Orchestrator::new(Arc::new(engine.clone()), dir.path(), 1);

    let first = orchestrator.start_task("https://example.com/1").unwrap();
    let second = orchestrator.start_task("https://example.com/2").unwrap();
    wait_until(|| engine.running() == 1).await;

    let waiting = orchestrator.status(&second).unwrap();
    assert_eq!(waiting.status, TaskStatus::Processing);
    assert_eq!(waiting.progress, 0);

    engine.release(2);
    settled(&orchestrator, &first).await;
    settled(&orchestrator, &second).await;
}

#[tokio::test]
async fn a_panicking_job_does_not_take_its_slot_with_it() {
    let dir = tempfile::tempdir().unwrap();
    let crashing = Orchestrator::new(Arc::new(PanickingEngine), dir.path(), 1);

    for i in 0..3 {
        let id = crashing
            .start_task(&format!("https://example.com/{i}"))
            .unwrap();
        assert_eq!(settled(&crashing, &id).await.status, TaskStatus::Failed);
    }
    wait_until(|| crashing.pool().active() == 0).await;
    assert!(crashing.shutdown(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn shutdown_drains_queue_and_rejects_new_tasks() {
    let dir = tempfile::tempdir().unwrap();
    let engine = GatedEngine::new();
    let orchestrator = Orchestrator::new(Arc::new(engine.clone()), dir.path(), 2);

    let ids: Vec<_> = (0..4)
        .map(|i| {
            orchestrator
                .start_task(&format!("https://example.com/{i}"))
                .unwrap()
        })
        .collect();

    let shutdown = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.shutdown(Duration::from_secs(10)).await }
    });
    wait_until(|| !orchestrator.pool().is_accepting()).await;

    let err = orchestrator.start_task("https://example.com/late").unwrap_err();
    assert!(matches!(err, Error::ShuttingDown));

    engine.release(4);
    assert!(shutdown.await.unwrap(), "shutdown should finish in time");
    for id in &ids {
        assert_eq!(orchestrator.status(id).unwrap().status, TaskStatus::Completed);
    }
}

#[tokio::test]
async fn shutdown_times_out_on_stuck_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let engine = GatedEngine::new();
    let orchestrator = Orchestrator::new(Arc::new(engine.clone()), dir.path(), 1);

    orchestrator.start_task("https://example.com/stuck").unwrap();
    wait_until(|| engine.running() == 1).await;

    assert!(!orchestrator.shutdown(Duration::from_millis(50)).await);
    engine.release(1);
}

#[tokio::test]
async fn pool_runs_plain_jobs_in_submission_order() {
    let pool = WorkerPool::new(1);
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    for i in 0..5 {
        let tx = tx.clone();
        pool.submit(move || async move {
            tx.send(i).ok();
        })
        .unwrap();
    }
    drop(tx);

    let mut order = Vec::new();
    while let Some(i) = rx.recv().await {
        order.push(i);
    }
    assert_eq!(order, vec![0, 1, 2, 3, 4]);
    assert!(pool.shutdown(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn many_quick_tasks_all_complete() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(Arc::new(TitleEngine), dir.path(), 4);

    let ids: Vec<_> = (0..25)
        .map(|i| {
            orchestrator
                .start_task(&format!("https://example.com/{i}"))
                .unwrap()
        })
        .collect();

    for id in &ids {
        assert_eq!(settled(&orchestrator, id).await.status, TaskStatus::Completed);
    }
    assert_eq!(orchestrator.registry().len(), 25);
}
