//! # Progress Reporter
//!
//! Throttles progress writes to a [`ProgressSink`]. A flush happens when the processed
//! count reaches a multiple of the batch size, when the flush interval has elapsed since
//! the last flush (or since creation), or when the declared total is reached.
//! Progress is observability only: sink failures are logged and never surface to the
//! caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RepositoryResult;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Destination for throttled progress counters.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn record_progress(
        &self,
        job_id: Uuid,
        processed: i32,
        succeeded: i32,
        failed: i32,
    ) -> RepositoryResult<()>;

    async fn record_total(&self, job_id: Uuid, total: i32) -> RepositoryResult<()>;
}

pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    job_id: Uuid,
    total: Option<i32>,
    batch_size: u32,
    flush_interval: Duration,
    processed: i32,
    succeeded: i32,
    failed: i32,
    last_flush: Instant,
    flushes: u64,
}

impl ProgressReporter {
    pub fn new(
        sink: Arc<dyn ProgressSink>,
        job_id: Uuid,
        total: Option<i32>,
        batch_size: u32,
    ) -> Self {
        Self {
            sink,
            job_id,
            total,
            batch_size: batch_size.max(1),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            processed: 0,
            succeeded: 0,
            failed: 0,
            last_flush: Instant::now(),
            flushes: 0,
        }
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Number of flushes issued so far, successful or not.
    pub fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// `(processed, succeeded, failed)`
    pub fn counts(&self) -> (i32, i32, i32) {
        (self.processed, self.succeeded, self.failed)
    }

    /// Count one successfully processed item.
    pub async fn increment(&mut self) {
        self.succeeded += 1;
        self.advance().await;
    }

    /// Count one item that failed.
    pub async fn increment_failed(&mut self) {
        self.failed += 1;
        self.advance().await;
    }

    /// Declare the total once it becomes known.
    pub async fn set_total(&mut self, total: i32) {
        self.total = Some(total);
        if let Err(err) = self.sink.record_total(self.job_id, total).await {
            warn!(job_id = %self.job_id, error = %err, "Failed to record job total");
        }
        if self.processed >= total {
            self.flush().await;
        }
    }

    /// Final flush of the accumulated counts, regardless of throttling.
    pub async fn finish(&mut self) {
        self.flush().await;
    }

    async fn advance(&mut self) {
        self.processed += 1;
        if self.should_flush() {
            self.flush().await;
        }
    }

    fn should_flush(&self) -> bool {
        let batch_boundary = self.processed % self.batch_size as i32 == 0;
        let interval_elapsed = self.last_flush.elapsed() >= self.flush_interval;
        let reached_total = self.total.is_some_and(|total| self.processed >= total);
        batch_boundary || interval_elapsed || reached_total
    }

    async fn flush(&mut self) {
        self.flushes += 1;
        self.last_flush = Instant::now();
        match self
            .sink
            .record_progress(self.job_id, self.processed, self.succeeded, self.failed)
            .await
        {
            Ok(()) => debug!(
                job_id = %self.job_id,
                processed = self.processed,
                "Progress flushed"
            ),
            Err(err) => warn!(
                job_id = %self.job_id,
                processed = self.processed,
                error = %err,
                "Failed to flush progress"
            ),
        }
    }
}
