//! # Sync Orchestrator
//!
//! Fetches one Kaya location subtree and persists it: the location itself, its climbs
//! (both categories), its ascents, and optionally its sub-locations down to a depth limit.
//! Only one sync runs per process at a time; a second caller fails fast with
//! [`SyncError::AlreadyRunning`].
//!
//! Failures are layered. A location that cannot be fetched fails the whole run. A page
//! that cannot be fetched ends only its phase. An item that cannot be stored is logged
//! and skipped. The first error seen is kept and returned once every phase has run.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use metrics::counter;
use sea_orm::DatabaseConnection;
use serde_json::json;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::RepositoryError;
use crate::job_tracker::JobTracker;
use crate::kaya::{ClientError, ClimbCategory, KayaClient, Location};
use crate::progress::{DEFAULT_FLUSH_INTERVAL, ProgressReporter};
use crate::repositories::{KayaRepository, SyncCounts};

pub const SYNC_JOB_TYPE: &str = "location_sync";
pub const DEFAULT_MAX_DEPTH: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_MAX_ASCENTS: u32 = 500;
pub const DEFAULT_RESYNC_INTERVAL_HOURS: i64 = 24;
const CANCELLED_MESSAGE: &str = "sync cancelled";

/// Job name used for a location sync, stable across runs for recovery lookups.
pub fn sync_job_name(slug: &str) -> String {
    format!("kaya_location_sync:{slug}")
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a location sync is already running")]
    AlreadyRunning,

    #[error("Kaya location '{0}' not found")]
    LocationNotFound(String),

    #[error("failed to fetch Kaya location '{slug}': {source}")]
    LocationFetch {
        slug: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to fetch {phase} for location {location_id}: {source}")]
    Fetch {
        phase: &'static str,
        location_id: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("sync cancelled")]
    Cancelled,
}

/// In-process exclusivity guard for location syncs.
#[derive(Clone, Default)]
pub struct SyncLock {
    inner: Arc<Mutex<()>>,
}

impl SyncLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire without waiting; `None` when another sync holds the lock.
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        self.inner.clone().try_lock_owned().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub recursive: bool,
    /// Sub-location levels to descend; 0 syncs only the root
    pub max_depth: u32,
}

impl SyncOptions {
    pub fn recursive(recursive: bool) -> Self {
        Self {
            recursive,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::recursive(true)
    }
}

/// Paging and bookkeeping parameters.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub page_size: u32,
    pub max_ascents_per_location: u32,
    pub resync_interval: Duration,
    pub progress_batch_size: u32,
    pub progress_flush_interval: StdDuration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_ascents_per_location: DEFAULT_MAX_ASCENTS,
            resync_interval: Duration::hours(DEFAULT_RESYNC_INTERVAL_HOURS),
            progress_batch_size: 10,
            progress_flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl From<&AppConfig> for SyncSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            page_size: config.sync.page_size,
            max_ascents_per_location: config.sync.max_ascents_per_location,
            resync_interval: Duration::hours(config.sync.resync_interval_hours as i64),
            progress_batch_size: config.progress.batch_size,
            progress_flush_interval: config.progress.flush_interval(),
        }
    }
}

/// Totals for one orchestrator invocation across the whole subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub job_id: Uuid,
    pub location_id: String,
    pub locations: u32,
    pub climbs: u32,
    pub ascents: u32,
    pub sub_locations: u32,
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Mutable state shared by every location visited in one run.
struct RunContext {
    options: SyncOptions,
    reporter: ProgressReporter,
    first_error: Option<SyncError>,
    cancelled: bool,
    report: SyncReport,
}

impl RunContext {
    fn record_error(&mut self, err: SyncError, location_error: &mut Option<String>) {
        if location_error.is_none() {
            *location_error = Some(err.to_string());
        }
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

pub struct SyncOrchestrator {
    db: DatabaseConnection,
    client: Arc<dyn KayaClient>,
    tracker: JobTracker,
    lock: SyncLock,
    settings: SyncSettings,
    cancel: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(db: DatabaseConnection, client: Arc<dyn KayaClient>) -> Self {
        let tracker = JobTracker::new(db.clone());
        Self {
            db,
            client,
            tracker,
            lock: SyncLock::new(),
            settings: SyncSettings::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tracker(mut self, tracker: JobTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Share a lock with other orchestrators in the same process.
    pub fn with_lock(mut self, lock: SyncLock) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }

    /// Sync a location with the default depth.
    pub async fn sync_location_by_slug(
        &self,
        slug: &str,
        recursive: bool,
    ) -> Result<SyncReport, SyncError> {
        self.sync_location(slug, SyncOptions::recursive(recursive))
            .await
    }

    #[instrument(skip(self), fields(job_id = tracing::field::Empty))]
    pub async fn sync_location(
        &self,
        slug: &str,
        options: SyncOptions,
    ) -> Result<SyncReport, SyncError> {
        let Some(_guard) = self.lock.try_acquire() else {
            warn!(slug, "Location sync already running");
            return Err(SyncError::AlreadyRunning);
        };

        let job = self
            .tracker
            .start_job(
                &sync_job_name(slug),
                SYNC_JOB_TYPE,
                None,
                Some(json!({
                    "slug": slug,
                    "recursive": options.recursive,
                    "max_depth": options.max_depth,
                })),
            )
            .await?;
        tracing::Span::current().record("job_id", tracing::field::display(job.id));

        let location = match self.client.get_location(slug).await {
            Ok(Some(location)) => location,
            Ok(None) => {
                let err = SyncError::LocationNotFound(slug.to_string());
                self.fail(job.id, &err).await;
                return Err(err);
            }
            Err(source) => {
                counter!("kaya_fetch_failures_total", "phase" => "location").increment(1);
                let err = SyncError::LocationFetch {
                    slug: slug.to_string(),
                    source,
                };
                self.fail(job.id, &err).await;
                return Err(err);
            }
        };

        if let Err(err) = KayaRepository::new(&self.db).upsert_location(&location).await {
            let err = SyncError::from(err);
            self.fail(job.id, &err).await;
            return Err(err);
        }

        let reporter = ProgressReporter::new(
            Arc::new(self.tracker.clone()),
            job.id,
            None,
            self.settings.progress_batch_size,
        )
        .with_flush_interval(self.settings.progress_flush_interval);

        let mut ctx = RunContext {
            options,
            reporter,
            first_error: None,
            cancelled: false,
            report: SyncReport {
                job_id: job.id,
                location_id: location.id.clone(),
                ..Default::default()
            },
        };

        self.sync_subtree(&mut ctx, &location, 0).await;
        ctx.reporter.finish().await;

        if ctx.cancelled {
            if let Err(err) = self.tracker.mark_job_paused(job.id).await {
                warn!(job_id = %job.id, error = %err, "Failed to pause cancelled job");
            }
            info!(job_id = %job.id, slug, "Location sync cancelled");
            return Err(SyncError::Cancelled);
        }

        match ctx.first_error {
            Some(err) => {
                self.fail(job.id, &err).await;
                Err(err)
            }
            None => {
                if let Err(err) = self.tracker.complete_job(job.id).await {
                    warn!(job_id = %job.id, error = %err, "Failed to complete sync job");
                }
                info!(
                    job_id = %job.id,
                    slug,
                    locations = ctx.report.locations,
                    climbs = ctx.report.climbs,
                    ascents = ctx.report.ascents,
                    "Location sync completed"
                );
                Ok(ctx.report)
            }
        }
    }

    async fn fail(&self, job_id: Uuid, err: &SyncError) {
        if let Err(tracker_err) = self.tracker.fail_job(job_id, &err.to_string()).await {
            warn!(job_id = %job_id, error = %tracker_err, "Failed to mark sync job failed");
        }
    }

    fn check_cancelled(&self, ctx: &mut RunContext) -> bool {
        if self.cancel.is_cancelled() {
            ctx.cancelled = true;
        }
        ctx.cancelled
    }

    /// Sync one already-persisted location and, depth permitting, its children.
    fn sync_subtree<'a>(
        &'a self,
        ctx: &'a mut RunContext,
        location: &'a Location,
        depth: u32,
    ) -> BoxFuture<'a, SyncCounts> {
        Box::pin(async move {
            let repo = KayaRepository::new(&self.db);
            let mut counts = SyncCounts::default();
            let mut location_error: Option<String> = None;

            if let Err(err) = repo.start_sync_progress(&location.id).await {
                warn!(location_id = %location.id, error = %err, "Failed to mark sync in progress");
            }
            if let Err(err) = self
                .tracker
                .set_current_item(ctx.report.job_id, &location.slug)
                .await
            {
                debug!(error = %err, "Failed to record current location");
            }

            if !self.check_cancelled(ctx) {
                counts.climbs = self
                    .sync_climbs(ctx, location, &mut location_error)
                    .await;
            }
            if !self.check_cancelled(ctx) {
                counts.ascents = self
                    .sync_ascents(ctx, location, &mut location_error)
                    .await;
            }
            if ctx.options.recursive
                && depth < ctx.options.max_depth
                && !self.check_cancelled(ctx)
            {
                counts.sub_locations = self
                    .sync_sub_locations(ctx, location, depth, &mut location_error)
                    .await;
            }

            let outcome = if ctx.cancelled {
                Some(CANCELLED_MESSAGE.to_string())
            } else {
                location_error
            };
            let next_sync_at = Utc::now() + self.settings.resync_interval;
            if let Err(err) = repo
                .finalize_sync_progress(&location.id, outcome.as_deref(), counts, next_sync_at)
                .await
            {
                warn!(location_id = %location.id, error = %err, "Failed to finalize sync progress");
            }

            ctx.report.locations += 1;
            ctx.report.climbs += counts.climbs as u32;
            ctx.report.ascents += counts.ascents as u32;
            debug!(
                location_id = %location.id,
                depth,
                climbs = counts.climbs,
                ascents = counts.ascents,
                sub_locations = counts.sub_locations,
                "Location synced"
            );
            counts
        })
    }

    async fn sync_climbs(
        &self,
        ctx: &mut RunContext,
        location: &Location,
        location_error: &mut Option<String>,
    ) -> i32 {
        let repo = KayaRepository::new(&self.db);
        let page_size = self.settings.page_size;
        let mut stored = 0;

        'categories: for category in ClimbCategory::ALL {
            let mut offset = 0;
            loop {
                if self.check_cancelled(ctx) {
                    break 'categories;
                }
                let page = match self
                    .client
                    .get_climbs(&location.id, Some(category), offset, page_size)
                    .await
                {
                    Ok(page) => page,
                    Err(source) => {
                        counter!("kaya_fetch_failures_total", "phase" => "climbs").increment(1);
                        warn!(location_id = %location.id, ?category, offset, error = %source, "Climb page fetch failed");
                        ctx.record_error(
                            SyncError::Fetch {
                                phase: "climbs",
                                location_id: location.id.clone(),
                                source,
                            },
                            location_error,
                        );
                        break 'categories;
                    }
                };

                for climb in &page {
                    match repo.upsert_climb(climb, Some(&location.id)).await {
                        Ok(()) => {
                            stored += 1;
                            ctx.reporter.increment().await;
                        }
                        Err(err) => {
                            warn!(slug = %climb.slug, error = %err, "Failed to store climb");
                            ctx.reporter.increment_failed().await;
                        }
                    }
                }
                counter!("kaya_items_synced_total", "kind" => "climb").increment(page.len() as u64);

                if (page.len() as u32) < page_size {
                    break;
                }
                offset += page_size;
            }
        }
        stored
    }

    async fn sync_ascents(
        &self,
        ctx: &mut RunContext,
        location: &Location,
        location_error: &mut Option<String>,
    ) -> i32 {
        let repo = KayaRepository::new(&self.db);
        let cap = self.settings.max_ascents_per_location;
        let mut fetched = 0u32;
        let mut stored = 0;

        while fetched < cap {
            if self.check_cancelled(ctx) {
                break;
            }
            let count = self.settings.page_size.min(cap - fetched);
            let page = match self.client.get_ascents(&location.id, fetched, count).await {
                Ok(page) => page,
                Err(source) => {
                    counter!("kaya_fetch_failures_total", "phase" => "ascents").increment(1);
                    warn!(location_id = %location.id, offset = fetched, error = %source, "Ascent page fetch failed");
                    ctx.record_error(
                        SyncError::Fetch {
                            phase: "ascents",
                            location_id: location.id.clone(),
                            source,
                        },
                        location_error,
                    );
                    break;
                }
            };

            for ascent in page.iter().take(count as usize) {
                match repo.upsert_ascent(ascent, &location.id).await {
                    Ok(()) => {
                        stored += 1;
                        ctx.reporter.increment().await;
                    }
                    Err(err) => {
                        warn!(ascent_id = %ascent.id, error = %err, "Failed to store ascent");
                        ctx.reporter.increment_failed().await;
                    }
                }
            }
            counter!("kaya_items_synced_total", "kind" => "ascent").increment(page.len() as u64);

            fetched += page.len() as u32;
            if (page.len() as u32) < count {
                break;
            }
        }
        stored
    }

    async fn sync_sub_locations(
        &self,
        ctx: &mut RunContext,
        location: &Location,
        depth: u32,
        location_error: &mut Option<String>,
    ) -> i32 {
        let repo = KayaRepository::new(&self.db);
        let page_size = self.settings.page_size;
        let mut offset = 0;
        let mut synced = 0;

        loop {
            if self.check_cancelled(ctx) {
                break;
            }
            let page = match self
                .client
                .get_sub_locations(&location.id, None, offset, page_size)
                .await
            {
                Ok(page) => page,
                Err(source) => {
                    counter!("kaya_fetch_failures_total", "phase" => "sub_locations").increment(1);
                    warn!(location_id = %location.id, offset, error = %source, "Sub-location page fetch failed");
                    ctx.record_error(
                        SyncError::Fetch {
                            phase: "sub_locations",
                            location_id: location.id.clone(),
                            source,
                        },
                        location_error,
                    );
                    break;
                }
            };

            for child in &page {
                if self.check_cancelled(ctx) {
                    break;
                }
                if let Err(err) = repo.upsert_location(child).await {
                    warn!(location_id = %child.id, error = %err, "Failed to store sub-location");
                    ctx.reporter.increment_failed().await;
                    continue;
                }
                self.sync_subtree(ctx, child, depth + 1).await;
                synced += 1;
                ctx.report.sub_locations += 1;
                ctx.reporter.increment().await;
            }
            counter!("kaya_items_synced_total", "kind" => "location").increment(page.len() as u64);

            if ctx.cancelled || (page.len() as u32) < page_size {
                break;
            }
            offset += page_size;
        }
        synced
    }
}
