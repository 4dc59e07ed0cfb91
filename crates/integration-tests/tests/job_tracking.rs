//! Job progress tracking and retry wrapping against the SQLite store

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use common::{TestStore, CLIENT};
use leadflow_core::application::{with_retry, RetryOptions};
use leadflow_core::domain::{JobMetrics, JobStatus, JobType, NewJob};
use leadflow_core::AppError;

fn metrics(value: serde_json::Value) -> JobMetrics {
    match value {
        serde_json::Value::Object(m) => m,
        _ => JobMetrics::new(),
    }
}

#[tokio::test]
async fn test_job_runs_to_completion() {
    let t = TestStore::open().await;
    let tracker = t.tracker();

    let job = tracker
        .create(NewJob::new(CLIENT, JobType::AiEnrichment).with_metrics(metrics(serde_json::json!({"total": 4}))))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Running);

    tracker
        .update_progress_and_phase(&job.id, 25, "researching", JobMetrics::new())
        .await;
    tracker.update_progress(&job.id, metrics(serde_json::json!({"processed": 1}))).await;
    tracker.update_progress_percentage(&job.id, 150).await;

    let running = tracker.get_by_id(&job.id).await.unwrap();
    assert_eq!(running.progress, 100);
    assert_eq!(running.current_phase.as_deref(), Some("researching"));
    assert_eq!(running.metrics["processed"], 1);

    t.clock.advance(5_000);
    let done = tracker
        .complete(&job.id, metrics(serde_json::json!({"processed": 4, "failed": 0})))
        .await
        .unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.completed_at, Some(job.created_at + 5_000));
    assert_eq!(done.metrics["total"], 4);
    assert_eq!(done.metrics["processed"], 4);

    assert!(tracker.get_active_jobs(CLIENT).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_terminal_job_ignores_late_updates() {
    let t = TestStore::open().await;
    let tracker = t.tracker();

    let job = tracker.create(NewJob::new(CLIENT, JobType::Upload)).await.unwrap();
    tracker.update_progress_percentage(&job.id, -10).await;
    assert_eq!(tracker.get_by_id(&job.id).await.unwrap().progress, 0);

    tracker.fail(&job.id, "destination rejected batch").await.unwrap();

    tracker
        .update_progress_and_phase(
            &job.id,
            80,
            "uploading",
            metrics(serde_json::json!({"uploaded": 8})),
        )
        .await;
    let stored = tracker.get_by_id(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.progress, 0);
    assert_eq!(stored.current_phase, None);
    assert!(stored.metrics.get("uploaded").is_none());
    assert_eq!(stored.error_message.as_deref(), Some("destination rejected batch"));

    assert!(matches!(
        tracker.complete(&job.id, JobMetrics::new()).await,
        Err(AppError::InvalidState(_))
    ));
}

#[tokio::test]
async fn test_progress_phase_and_metrics_land_together() {
    let t = TestStore::open().await;
    let tracker = t.tracker();

    let job = tracker
        .create(NewJob::new(CLIENT, JobType::AiEnrichment).with_metrics(metrics(serde_json::json!({"total": 50}))))
        .await
        .unwrap();

    tracker
        .update_progress_and_phase(
            &job.id,
            40,
            "qualifying",
            metrics(serde_json::json!({"processed": 20, "qualified": 12})),
        )
        .await;

    let stored = tracker.get_by_id(&job.id).await.unwrap();
    assert_eq!(stored.progress, 40);
    assert_eq!(stored.current_phase.as_deref(), Some("qualifying"));
    assert_eq!(stored.metrics["total"], 50);
    assert_eq!(stored.metrics["processed"], 20);
    assert_eq!(stored.metrics["qualified"], 12);

    tracker.complete(&job.id, JobMetrics::new()).await.unwrap();
    tracker
        .update_progress_and_phase(
            &job.id,
            90,
            "generating",
            metrics(serde_json::json!({"processed": 45})),
        )
        .await;

    let stored = tracker.get_by_id(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.progress, 40);
    assert_eq!(stored.current_phase.as_deref(), Some("qualifying"));
    assert_eq!(stored.metrics["processed"], 20);
}

#[tokio::test]
async fn test_active_jobs_per_client() {
    let t = TestStore::open().await;
    let tracker = t.tracker();

    let first = tracker.create(NewJob::new(CLIENT, JobType::Ingestion)).await.unwrap();
    t.clock.advance(1);
    let second = tracker
        .create(NewJob::new(CLIENT, JobType::FindymailEnrichment))
        .await
        .unwrap();
    tracker.create(NewJob::new("globex", JobType::Upload)).await.unwrap();

    let active = tracker.get_active_jobs(CLIENT).await.unwrap();
    let ids: Vec<&str> = active.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
}

#[tokio::test]
async fn test_retry_wraps_store_reads() {
    let t = TestStore::open().await;
    let lifecycle = t.lifecycle();
    let attempts = AtomicU32::new(0);

    // Not found is not transient: one attempt only
    let result = with_retry(
        || {
            attempts.fetch_add(1, Ordering::SeqCst);
            lifecycle.get_by_id("missing")
        },
        RetryOptions::<AppError>::new()
            .delay(Duration::from_millis(1))
            .transient_only(),
    )
    .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}
