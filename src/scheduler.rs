//! # Priority Scheduler
//!
//! Recomputes rolling activity metrics for every canonical route not bound to a Kaya
//! location and assigns each a re-sync tier. Routes are then served per tier by
//! [`PriorityScheduler::due_routes`] once their tier interval has elapsed.
//! Location-bound routes are skipped: they sync daily along with their location.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use sea_orm::sea_query::{Expr, Func, Query};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use tokio::time::{Duration as TokioDuration, Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PriorityConfig;
use crate::error::RepositoryResult;
use crate::job_tracker::JobTracker;
use crate::models::mp_area::{Column as AreaColumn, Entity as MpArea};
use crate::models::mp_route::{Column as RouteColumn, Entity as MpRoute};
use crate::models::mp_tick::{Column as TickColumn, Entity as MpTick};
use crate::models::route_priority::{Model as PriorityModel, PriorityTier};
use crate::repositories::{RouteMetrics, RoutePriorityRepository};

pub const RECOMPUTE_JOB_NAME: &str = "priority_recompute";
const RECOMPUTE_JOB_TYPE: &str = "priority_recompute";

const RECENT_WINDOW_DAYS: i64 = 14;
const ACTIVITY_WINDOW_DAYS: i64 = 90;
/// A prior tick older than this makes a fresh tick a reactivation.
const DORMANCY_DAYS: i32 = 90;
const TOP_PERCENTILE: f64 = 85.0;
const MEDIUM_PERCENTILE: f64 = 60.0;
const BUSY_TICKS_90D: i32 = 5;
const SEASONAL_TYPES: [&str; 4] = ["ice", "alpine", "snow", "mixed"];

/// Per-route tick aggregate as returned by the database:
/// route id, 14-day count, 90-day count, total, latest tick, latest tick outside 14 days.
type TickAggregateRow = (
    i64,
    i64,
    i64,
    i64,
    Option<DateTimeWithTimeZone>,
    Option<DateTimeWithTimeZone>,
);

/// Tick counts and dates for one route.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct TickTotals {
    ticks_14d: i64,
    ticks_90d: i64,
    ticks_total: i64,
    last_tick: Option<DateTime<Utc>>,
    prior_tick: Option<DateTime<Utc>>,
}

/// Activity signals for one route before percentile ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteActivity {
    pub route_id: i64,
    pub area_id: i64,
    pub route_type: Option<String>,
    pub ticks_14d: i32,
    pub ticks_90d: i32,
    pub ticks_total: i32,
    pub days_since_last_tick: Option<i32>,
    pub days_since_prior_tick: Option<i32>,
}

impl RouteActivity {
    fn new(route_id: i64, area_id: i64, route_type: Option<String>) -> Self {
        Self {
            route_id,
            area_id,
            route_type,
            ticks_14d: 0,
            ticks_90d: 0,
            ticks_total: 0,
            days_since_last_tick: None,
            days_since_prior_tick: None,
        }
    }

    fn apply_ticks(&mut self, totals: TickTotals, now: DateTime<Utc>) {
        let age_days = |tick: DateTime<Utc>| (now - tick).num_days().max(0) as i32;
        self.ticks_14d = totals.ticks_14d as i32;
        self.ticks_90d = totals.ticks_90d as i32;
        self.ticks_total = totals.ticks_total as i32;
        self.days_since_last_tick = totals.last_tick.map(age_days);
        self.days_since_prior_tick = totals.prior_tick.map(age_days);
    }
}

/// First-match tier cascade.
pub fn assign_tier(activity: &RouteActivity, area_percentile: f64) -> PriorityTier {
    if is_seasonal(activity.route_type.as_deref()) {
        return PriorityTier::High;
    }
    let reactivated = activity.ticks_14d >= 1
        && activity
            .days_since_prior_tick
            .is_some_and(|days| days > DORMANCY_DAYS);
    if reactivated {
        return PriorityTier::High;
    }
    if area_percentile >= TOP_PERCENTILE {
        return PriorityTier::High;
    }
    if activity.ticks_90d >= BUSY_TICKS_90D {
        return PriorityTier::High;
    }
    if activity.ticks_90d > 0 || area_percentile >= MEDIUM_PERCENTILE {
        return PriorityTier::Medium;
    }
    PriorityTier::Low
}

fn is_seasonal(route_type: Option<&str>) -> bool {
    let Some(route_type) = route_type else {
        return false;
    };
    let lowered = route_type.to_lowercase();
    SEASONAL_TYPES.iter().any(|t| lowered.contains(t))
}

/// Percent rank of `ticks_90d` within each area, keyed by route id.
///
/// `100 * (routes with strictly fewer ticks) / (routes in area - 1)`; 0 for single-route areas.
pub fn area_percentiles(activities: &[RouteActivity]) -> HashMap<i64, f64> {
    let mut by_area: HashMap<i64, Vec<i32>> = HashMap::new();
    for a in activities {
        by_area.entry(a.area_id).or_default().push(a.ticks_90d);
    }
    for counts in by_area.values_mut() {
        counts.sort_unstable();
    }

    activities
        .iter()
        .map(|a| {
            let counts = &by_area[&a.area_id];
            let percentile = if counts.len() <= 1 {
                0.0
            } else {
                let lower = counts.partition_point(|&c| c < a.ticks_90d);
                100.0 * lower as f64 / (counts.len() - 1) as f64
            };
            (a.route_id, percentile)
        })
        .collect()
}

/// Outcome of one recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecomputeSummary {
    pub routes: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub removed_location_bound: u64,
}

/// Background scheduler for route re-sync priorities.
#[derive(Clone)]
pub struct PriorityScheduler {
    db: DatabaseConnection,
    tracker: JobTracker,
    config: PriorityConfig,
}

impl PriorityScheduler {
    pub fn new(db: DatabaseConnection, config: PriorityConfig) -> Self {
        let tracker = JobTracker::new(db.clone());
        Self {
            db,
            tracker,
            config,
        }
    }

    pub fn with_tracker(mut self, tracker: JobTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Re-sync interval for a tier.
    pub fn tier_interval(&self, tier: PriorityTier) -> Duration {
        let hours = match tier {
            PriorityTier::High => self.config.high_interval_hours,
            PriorityTier::Medium => self.config.medium_interval_hours,
            PriorityTier::Low => self.config.low_interval_hours,
        };
        Duration::hours(hours as i64)
    }

    /// Run recomputations on the configured interval until `shutdown` fires.
    #[instrument(skip_all)]
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting priority scheduler");
        // First tick completes immediately so tiers exist right after startup.
        let mut ticker = interval(TokioDuration::from_secs(
            self.config.recompute_interval_seconds.max(1),
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Priority scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.recompute().await {
                        error!(error = %err, "Priority recomputation failed");
                    }
                }
            }
        }

        info!("Priority scheduler stopped");
    }

    /// Recompute metrics and tiers for every non-location-bound route, as a tracked job.
    #[instrument(skip(self))]
    pub async fn recompute(&self) -> RepositoryResult<RecomputeSummary> {
        self.recompute_at(Utc::now()).await
    }

    /// Like [`recompute`](Self::recompute) with an explicit reference time.
    pub async fn recompute_at(&self, now: DateTime<Utc>) -> RepositoryResult<RecomputeSummary> {
        let job = self
            .tracker
            .start_job(RECOMPUTE_JOB_NAME, RECOMPUTE_JOB_TYPE, None, None)
            .await?;
        let started = Instant::now();

        match self.compute_and_store(now, job.id).await {
            Ok(summary) => {
                if let Err(err) = self
                    .tracker
                    .update_progress(job.id, summary.routes as i32, summary.routes as i32, 0)
                    .await
                {
                    warn!(job_id = %job.id, error = %err, "Failed to record recompute progress");
                }
                self.tracker.complete_job(job.id).await?;

                histogram!("priority_recompute_duration_ms")
                    .record(started.elapsed().as_secs_f64() * 1_000.0);
                gauge!("route_priority_tier_routes", "tier" => "high").set(summary.high as f64);
                gauge!("route_priority_tier_routes", "tier" => "medium").set(summary.medium as f64);
                gauge!("route_priority_tier_routes", "tier" => "low").set(summary.low as f64);
                info!(
                    routes = summary.routes,
                    high = summary.high,
                    medium = summary.medium,
                    low = summary.low,
                    "Route priorities recomputed"
                );
                Ok(summary)
            }
            Err(err) => {
                counter!("priority_recompute_failures_total").increment(1);
                if let Err(fail_err) = self.tracker.fail_job(job.id, &err.to_string()).await {
                    warn!(job_id = %job.id, error = %fail_err, "Failed to mark recompute job failed");
                }
                Err(err)
            }
        }
    }

    async fn compute_and_store(
        &self,
        now: DateTime<Utc>,
        job_id: uuid::Uuid,
    ) -> RepositoryResult<RecomputeSummary> {
        let activities = self.load_activity(now).await?;
        if let Err(err) = self
            .tracker
            .set_total_items(job_id, activities.len() as i32)
            .await
        {
            warn!(job_id = %job_id, error = %err, "Failed to record recompute total");
        }

        let percentiles = area_percentiles(&activities);
        let mut summary = RecomputeSummary::default();
        let metrics: Vec<RouteMetrics> = activities
            .iter()
            .map(|a| {
                let percentile = percentiles.get(&a.route_id).copied().unwrap_or(0.0);
                let tier = assign_tier(a, percentile);
                match tier {
                    PriorityTier::High => summary.high += 1,
                    PriorityTier::Medium => summary.medium += 1,
                    PriorityTier::Low => summary.low += 1,
                }
                RouteMetrics {
                    route_id: a.route_id,
                    area_id: a.area_id,
                    ticks_14d: a.ticks_14d,
                    ticks_90d: a.ticks_90d,
                    ticks_total: a.ticks_total,
                    days_since_last_tick: a.days_since_last_tick,
                    days_since_prior_tick: a.days_since_prior_tick,
                    area_percentile: percentile,
                    priority_tier: tier,
                }
            })
            .collect();

        let repo = RoutePriorityRepository::new(&self.db);
        summary.routes = repo.upsert_metrics(&metrics, now).await?;
        summary.removed_location_bound = repo.delete_location_bound().await?;
        Ok(summary)
    }

    /// Aggregate tick activity per eligible route.
    async fn load_activity(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<RouteActivity>> {
        let bound_areas = Query::select()
            .column(AreaColumn::Id)
            .from(MpArea)
            .and_where(AreaColumn::KayaLocationId.is_not_null())
            .to_owned();

        let routes: Vec<(i64, i64, Option<String>)> = MpRoute::find()
            .select_only()
            .column(RouteColumn::Id)
            .column(RouteColumn::AreaId)
            .column(RouteColumn::RouteType)
            .filter(RouteColumn::AreaId.not_in_subquery(bound_areas))
            .order_by_asc(RouteColumn::Id)
            .into_tuple()
            .all(&self.db)
            .await?;

        let mut index: HashMap<i64, usize> = HashMap::with_capacity(routes.len());
        let mut activities = Vec::with_capacity(routes.len());
        for (route_id, area_id, route_type) in routes {
            index.insert(route_id, activities.len());
            activities.push(RouteActivity::new(route_id, area_id, route_type));
        }

        for (route_id, ticks) in self.tick_totals(now).await? {
            if let Some(&i) = index.get(&route_id) {
                activities[i].apply_ticks(ticks, now);
            }
        }

        debug!(routes = activities.len(), "Route activity aggregated");
        Ok(activities)
    }

    /// Window counts and tick dates per route, aggregated in one grouped query.
    async fn tick_totals(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<(i64, TickTotals)>> {
        let recent_cutoff = (now - Duration::days(RECENT_WINDOW_DAYS)).fixed_offset();
        let activity_cutoff = (now - Duration::days(ACTIVITY_WINDOW_DAYS)).fixed_offset();
        let in_window = |cutoff: DateTimeWithTimeZone| {
            Func::sum(Expr::case(TickColumn::TickDate.gte(cutoff), 1).finally(0))
        };

        let rows: Vec<TickAggregateRow> = MpTick::find()
            .select_only()
            .column(TickColumn::RouteId)
            .expr(in_window(recent_cutoff))
            .expr(in_window(activity_cutoff))
            .expr(Func::count(Expr::col(TickColumn::Id)))
            .expr(Func::max(Expr::col(TickColumn::TickDate)))
            .expr(Func::max(Expr::case(
                TickColumn::TickDate.lt(recent_cutoff),
                Expr::col(TickColumn::TickDate),
            )))
            .group_by(TickColumn::RouteId)
            .into_tuple()
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(route_id, ticks_14d, ticks_90d, ticks_total, last, prior)| {
                let totals = TickTotals {
                    ticks_14d,
                    ticks_90d,
                    ticks_total,
                    last_tick: last.map(|t| t.with_timezone(&Utc)),
                    prior_tick: prior.map(|t| t.with_timezone(&Utc)),
                };
                (route_id, totals)
            })
            .collect())
    }

    /// Routes of `tier` due for re-sync, never-synced first then oldest first.
    pub async fn due_routes(&self, tier: PriorityTier, limit: u64) -> RepositoryResult<Vec<PriorityModel>> {
        let cutoff = Utc::now() - self.tier_interval(tier);
        RoutePriorityRepository::new(&self.db)
            .due_routes(tier, cutoff, limit)
            .await
    }

    pub async fn mark_route_synced(&self, route_id: i64, at: DateTime<Utc>) -> RepositoryResult<()> {
        RoutePriorityRepository::new(&self.db)
            .mark_route_synced(route_id, at)
            .await
    }
}
