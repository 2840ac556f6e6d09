mod test_utils;

use anyhow::Result;
use chrono::{Duration, Utc};
use climb_sync::checkpoint::{CheckpointError, CheckpointState};
use climb_sync::job_tracker::JobTracker;
use climb_sync::models::job_execution::{self, JobStatus};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use serde_json::json;
use test_utils::setup_test_db;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PageCursor {
    offset: u32,
}

impl CheckpointState for PageCursor {
    const KIND: &'static str = "page_cursor";
    const VERSION: u32 = 1;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PageCursorV2 {
    offset: u32,
}

impl CheckpointState for PageCursorV2 {
    const KIND: &'static str = "page_cursor";
    const VERSION: u32 = 2;
}

async fn backdate(tracker: &JobTracker, job_id: Uuid, hours: i64) -> Result<()> {
    job_execution::Entity::update_many()
        .set(job_execution::ActiveModel {
            started_at: Set((Utc::now() - Duration::hours(hours)).fixed_offset()),
            ..Default::default()
        })
        .filter(job_execution::Column::Id.eq(job_id))
        .exec(tracker.db())
        .await?;
    Ok(())
}

#[tokio::test]
async fn start_job_records_running_execution() -> Result<()> {
    let db = setup_test_db().await?;
    let tracker = JobTracker::new(db);

    let job = tracker
        .start_job("kaya_location_sync:red-rock", "location_sync", Some(40), Some(json!({"slug": "red-rock"})))
        .await?;

    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.total_items, Some(40));
    assert_eq!(job.processed_items, 0);
    assert!(job.completed_at.is_none());

    let err = tracker.start_job("  ", "location_sync", None, None).await;
    assert!(err.is_err());
    Ok(())
}

#[tokio::test]
async fn progress_is_clamped_to_total() -> Result<()> {
    let db = setup_test_db().await?;
    let tracker = JobTracker::new(db);
    let job = tracker.start_job("clamp", "test", Some(10), None).await?;

    tracker.update_progress(job.id, 15, 14, 1).await?;

    let stored = tracker.get_job(job.id).await?.expect("job exists");
    assert_eq!(stored.processed_items, 10);
    assert_eq!(stored.succeeded_items, 14);
    assert_eq!(stored.failed_items, 1);
    Ok(())
}

#[tokio::test]
async fn finished_jobs_reject_progress_and_status_changes() -> Result<()> {
    let db = setup_test_db().await?;
    let tracker = JobTracker::new(db);
    let job = tracker.start_job("finished", "test", None, None).await?;

    tracker.update_progress(job.id, 3, 3, 0).await?;
    tracker.complete_job(job.id).await?;

    let err = tracker
        .update_progress(job.id, 5, 5, 0)
        .await
        .expect_err("completed job must not accept progress");
    assert!(err.is_not_found());

    assert!(tracker.fail_job(job.id, "late failure").await.is_err());
    assert!(tracker.mark_job_paused(job.id).await.is_err());

    let stored = tracker.get_job(job.id).await?.expect("job exists");
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.processed_items, 3);
    assert!(stored.completed_at.is_some());
    assert!(stored.error_message.is_none());
    Ok(())
}

#[tokio::test]
async fn fail_and_cancel_record_messages() -> Result<()> {
    let db = setup_test_db().await?;
    let tracker = JobTracker::new(db);

    let failed = tracker.start_job("fails", "test", None, None).await?;
    tracker.fail_job(failed.id, "boom").await?;
    let stored = tracker.get_job(failed.id).await?.expect("job exists");
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.error_message.as_deref(), Some("boom"));

    let cancelled = tracker.start_job("cancels", "test", None, None).await?;
    tracker.cancel_job(cancelled.id, Some("operator request")).await?;
    let stored = tracker.get_job(cancelled.id).await?.expect("job exists");
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert!(stored.status.is_terminal());
    Ok(())
}

#[tokio::test]
async fn interrupted_job_found_only_within_recovery_window() -> Result<()> {
    let db = setup_test_db().await?;
    let tracker = JobTracker::new(db);

    let recent = tracker.start_job("recent", "test", None, None).await?;
    backdate(&tracker, recent.id, 23).await?;
    let stale = tracker.start_job("stale", "test", None, None).await?;
    backdate(&tracker, stale.id, 25).await?;

    let found = tracker.get_interrupted_job("recent").await?;
    assert_eq!(found.map(|j| j.id), Some(recent.id));
    assert!(tracker.get_interrupted_job("stale").await?.is_none());

    let all = tracker.recover_interrupted_jobs(Duration::hours(48)).await?;
    assert_eq!(all.iter().map(|j| j.id).collect::<Vec<_>>(), vec![recent.id, stale.id]);
    Ok(())
}

#[tokio::test]
async fn paused_job_is_recoverable_and_resumable() -> Result<()> {
    let db = setup_test_db().await?;
    let tracker = JobTracker::new(db);
    let job = tracker.start_job("pausable", "test", None, None).await?;

    tracker.mark_job_paused(job.id).await?;
    let interrupted = tracker
        .get_interrupted_job("pausable")
        .await?
        .expect("paused job is interrupted");
    assert_eq!(interrupted.status, JobStatus::Paused);

    let resumed = tracker.resume_job(job.id).await?;
    assert_eq!(resumed.status, JobStatus::Running);
    tracker.update_progress(job.id, 1, 1, 0).await?;

    tracker.complete_job(job.id).await?;
    assert!(tracker.get_interrupted_job("pausable").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn checkpoint_round_trips_and_preserves_metadata() -> Result<()> {
    let db = setup_test_db().await?;
    let tracker = JobTracker::new(db);
    let job = tracker
        .start_job("checkpointed", "test", None, Some(json!({"slug": "bishop"})))
        .await?;

    assert!(tracker.load_checkpoint::<PageCursor>(job.id).await?.is_none());

    tracker.save_checkpoint(job.id, &PageCursor { offset: 40 }).await?;
    tracker.set_current_item(job.id, "buttermilks").await?;

    let loaded = tracker.load_checkpoint::<PageCursor>(job.id).await?;
    assert_eq!(loaded, Some(PageCursor { offset: 40 }));

    let stored = tracker.get_job(job.id).await?.expect("job exists");
    let metadata = stored.metadata.expect("metadata present");
    assert_eq!(metadata["slug"], "bishop");
    assert_eq!(metadata["current_item"], "buttermilks");
    assert!(metadata["checkpoint_at"].is_string());

    let err = tracker
        .load_checkpoint::<PageCursorV2>(job.id)
        .await
        .expect_err("version mismatch is rejected");
    assert!(matches!(err, CheckpointError::VersionMismatch { .. }));
    Ok(())
}

#[tokio::test]
async fn set_total_clamps_existing_progress() -> Result<()> {
    let db = setup_test_db().await?;
    let tracker = JobTracker::new(db);
    let job = tracker.start_job("late-total", "test", None, None).await?;

    tracker.update_progress(job.id, 12, 12, 0).await?;
    tracker.set_total_items(job.id, 8).await?;

    let stored = tracker.get_job(job.id).await?.expect("job exists");
    assert_eq!(stored.total_items, Some(8));
    assert_eq!(stored.processed_items, 8);
    Ok(())
}
