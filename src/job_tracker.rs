//! # Job Execution Tracker
//!
//! Durable lifecycle records for long-running batch tasks. Every state change is a
//! conditional update on the current status, so a writer holding a stale job id can
//! never move a finished execution back into an active state.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::checkpoint::{
    CURRENT_ITEM_KEY, CheckpointError, CheckpointState, checkpoint_entries, merge_metadata,
    read_checkpoint,
};
use crate::error::{RepositoryError, RepositoryResult};
use crate::models::job_execution::{ActiveModel, Column, Entity, JobStatus, Model};
use crate::progress::ProgressSink;

/// Default window within which an interrupted job is resumed automatically.
pub const DEFAULT_RECOVERY_WINDOW_HOURS: i64 = 24;

/// Tracker for `job_executions` rows.
#[derive(Clone)]
pub struct JobTracker {
    db: DatabaseConnection,
    recovery_window: Duration,
}

impl JobTracker {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            recovery_window: Duration::hours(DEFAULT_RECOVERY_WINDOW_HOURS),
        }
    }

    /// Override the automatic recovery window.
    pub fn with_recovery_window(mut self, window: Duration) -> Self {
        self.recovery_window = window;
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Start a new execution in `running` status.
    #[instrument(skip(self, metadata))]
    pub async fn start_job(
        &self,
        job_name: &str,
        job_type: &str,
        total_items: Option<i32>,
        metadata: Option<JsonValue>,
    ) -> RepositoryResult<Model> {
        if job_name.trim().is_empty() {
            return Err(RepositoryError::validation("job name cannot be empty"));
        }

        let now = Utc::now().fixed_offset();
        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            job_name: Set(job_name.to_string()),
            job_type: Set(job_type.to_string()),
            status: Set(JobStatus::Running),
            total_items: Set(total_items.map(|t| t.max(0))),
            processed_items: Set(0),
            succeeded_items: Set(0),
            failed_items: Set(0),
            started_at: Set(now),
            completed_at: Set(None),
            error_message: Set(None),
            metadata: Set(metadata),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = job.insert(&self.db).await.map_err(|e| {
            error!("Failed to start job {}: {}", job_name, e);
            RepositoryError::from(e)
        })?;

        counter!("job_executions_started_total", "job_type" => job_type.to_string()).increment(1);
        info!(job_id = %model.id, job_name, job_type, "Job started");
        Ok(model)
    }

    pub async fn get_job(&self, job_id: Uuid) -> RepositoryResult<Option<Model>> {
        Ok(Entity::find_by_id(job_id).one(&self.db).await?)
    }

    /// Record progress counters for a running job.
    ///
    /// Returns `NotFound` without writing anything when the job is not `running`.
    /// `processed` is clamped to `total_items` once the total is known.
    pub async fn update_progress(
        &self,
        job_id: Uuid,
        processed: i32,
        succeeded: i32,
        failed: i32,
    ) -> RepositoryResult<()> {
        let job = Entity::find_by_id(job_id)
            .filter(Column::Status.eq(JobStatus::Running))
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("running job {job_id}")))?;

        let processed = clamp_processed(processed, job.total_items);

        let result = Entity::update_many()
            .set(ActiveModel {
                processed_items: Set(processed),
                succeeded_items: Set(succeeded.max(0)),
                failed_items: Set(failed.max(0)),
                updated_at: Set(Utc::now().fixed_offset()),
                ..Default::default()
            })
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(JobStatus::Running))
            .exec(&self.db)
            .await?;

        // The job may have finished between the read and the write.
        if result.rows_affected == 0 {
            return Err(RepositoryError::not_found(format!("running job {job_id}")));
        }

        debug!(job_id = %job_id, processed, succeeded, failed, "Job progress updated");
        Ok(())
    }

    /// Record the total once it becomes known. Already-processed counts are clamped.
    pub async fn set_total_items(&self, job_id: Uuid, total: i32) -> RepositoryResult<()> {
        if total < 0 {
            return Err(RepositoryError::validation("total items cannot be negative"));
        }
        let job = self.find_active(job_id).await?;
        let mut active: ActiveModel = job.clone().into();
        active.total_items = Set(Some(total));
        active.processed_items = Set(clamp_processed(job.processed_items, Some(total)));
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await?;
        Ok(())
    }

    /// Mark an active job `completed`.
    #[instrument(skip(self))]
    pub async fn complete_job(&self, job_id: Uuid) -> RepositoryResult<()> {
        self.finish(job_id, JobStatus::Completed, None).await
    }

    /// Mark an active job `failed` with an error message.
    #[instrument(skip(self))]
    pub async fn fail_job(&self, job_id: Uuid, error_message: &str) -> RepositoryResult<()> {
        self.finish(job_id, JobStatus::Failed, Some(error_message.to_string()))
            .await
    }

    /// Mark an active job `cancelled`.
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, job_id: Uuid, reason: Option<&str>) -> RepositoryResult<()> {
        self.finish(job_id, JobStatus::Cancelled, reason.map(str::to_string))
            .await
    }

    async fn finish(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
    ) -> RepositoryResult<()> {
        let now = Utc::now().fixed_offset();
        let mut update = ActiveModel {
            status: Set(status),
            completed_at: Set(Some(now)),
            updated_at: Set(now),
            ..Default::default()
        };
        if error_message.is_some() {
            update.error_message = Set(error_message);
        }

        let result = Entity::update_many()
            .set(update)
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.is_in(JobStatus::resumable()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!(job_id = %job_id, ?status, "Job not active; terminal status not applied");
            return Err(RepositoryError::not_found(format!("active job {job_id}")));
        }

        let outcome = match status {
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Running | JobStatus::Paused => "other",
        };
        counter!("job_executions_finished_total", "status" => outcome).increment(1);
        info!(job_id = %job_id, ?status, "Job finished");
        Ok(())
    }

    /// Transition `running -> paused` for graceful shutdown.
    #[instrument(skip(self))]
    pub async fn mark_job_paused(&self, job_id: Uuid) -> RepositoryResult<()> {
        self.transition(job_id, JobStatus::Running, JobStatus::Paused)
            .await
    }

    /// Transition `paused -> running` so a recovered job can continue.
    #[instrument(skip(self))]
    pub async fn resume_job(&self, job_id: Uuid) -> RepositoryResult<Model> {
        self.transition(job_id, JobStatus::Paused, JobStatus::Running)
            .await?;
        Entity::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("job {job_id}")))
    }

    async fn transition(&self, job_id: Uuid, from: JobStatus, to: JobStatus) -> RepositoryResult<()> {
        let result = Entity::update_many()
            .set(ActiveModel {
                status: Set(to),
                updated_at: Set(Utc::now().fixed_offset()),
                ..Default::default()
            })
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(from))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::not_found(format!(
                "job {job_id} in status {from:?}"
            )));
        }
        info!(job_id = %job_id, ?from, ?to, "Job status changed");
        Ok(())
    }

    /// Merge a typed checkpoint into the job's metadata alongside `checkpoint_at`.
    pub async fn save_checkpoint<C: CheckpointState>(
        &self,
        job_id: Uuid,
        state: &C,
    ) -> Result<(), CheckpointError> {
        let entries = checkpoint_entries(state, Utc::now())?;
        self.merge_into_metadata(job_id, entries).await?;
        debug!(job_id = %job_id, kind = C::KIND, "Checkpoint saved");
        Ok(())
    }

    /// Load the job's checkpoint, rejecting a different kind or version.
    pub async fn load_checkpoint<C: CheckpointState>(
        &self,
        job_id: Uuid,
    ) -> Result<Option<C>, CheckpointError> {
        let job = self
            .get_job(job_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("job {job_id}")))?;
        read_checkpoint(job.metadata.as_ref())
    }

    /// Record which item the job is currently working on.
    pub async fn set_current_item(&self, job_id: Uuid, item: &str) -> RepositoryResult<()> {
        self.merge_into_metadata(
            job_id,
            vec![(CURRENT_ITEM_KEY, JsonValue::String(item.to_string()))],
        )
        .await
    }

    async fn merge_into_metadata(
        &self,
        job_id: Uuid,
        entries: Vec<(&str, JsonValue)>,
    ) -> RepositoryResult<()> {
        let job = self.find_active(job_id).await?;
        let merged = merge_metadata(job.metadata.clone(), entries);
        let mut active: ActiveModel = job.into();
        active.metadata = Set(Some(merged));
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn find_active(&self, job_id: Uuid) -> RepositoryResult<Model> {
        Entity::find_by_id(job_id)
            .filter(Column::Status.is_in(JobStatus::resumable()))
            .one(&self.db)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("active job {job_id}")))
    }

    /// Most recent `running` or `paused` execution of `job_name` started within the
    /// recovery window.
    pub async fn get_interrupted_job(&self, job_name: &str) -> RepositoryResult<Option<Model>> {
        let cutoff = (Utc::now() - self.recovery_window).fixed_offset();
        Ok(Entity::find()
            .filter(Column::JobName.eq(job_name))
            .filter(Column::Status.is_in(JobStatus::resumable()))
            .filter(Column::StartedAt.gte(cutoff))
            .order_by_desc(Column::StartedAt)
            .one(&self.db)
            .await?)
    }

    /// Every `running` or `paused` execution started within `max_age`, newest first.
    pub async fn recover_interrupted_jobs(&self, max_age: Duration) -> RepositoryResult<Vec<Model>> {
        let cutoff = (Utc::now() - max_age).fixed_offset();
        let jobs = Entity::find()
            .filter(Column::Status.is_in(JobStatus::resumable()))
            .filter(Column::StartedAt.gte(cutoff))
            .order_by_desc(Column::StartedAt)
            .all(&self.db)
            .await?;
        info!(count = jobs.len(), "Interrupted jobs found");
        Ok(jobs)
    }
}

#[async_trait]
impl ProgressSink for JobTracker {
    async fn record_progress(
        &self,
        job_id: Uuid,
        processed: i32,
        succeeded: i32,
        failed: i32,
    ) -> RepositoryResult<()> {
        self.update_progress(job_id, processed, succeeded, failed)
            .await
    }

    async fn record_total(&self, job_id: Uuid, total: i32) -> RepositoryResult<()> {
        self.set_total_items(job_id, total).await
    }
}

fn clamp_processed(processed: i32, total: Option<i32>) -> i32 {
    let processed = processed.max(0);
    match total {
        Some(total) => processed.min(total),
        None => processed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_is_clamped_to_known_total() {
        assert_eq!(clamp_processed(12, Some(10)), 10);
        assert_eq!(clamp_processed(7, Some(10)), 7);
        assert_eq!(clamp_processed(12, None), 12);
        assert_eq!(clamp_processed(-3, None), 0);
    }
}
