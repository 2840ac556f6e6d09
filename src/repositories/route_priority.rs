//! # Route Priority Repository
//!
//! Bulk writes of recomputed route metrics and the "what is due" queries per tier.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{NullOrdering, OnConflict, Order, Query};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set, TransactionTrait,
};

use crate::error::{RepositoryError, RepositoryResult};
use crate::models::mp_area::{Column as AreaColumn, Entity as MpArea};
use crate::models::route_priority::{
    ActiveModel as PriorityActiveModel, Column as PriorityColumn, Entity as RoutePriority,
    Model as PriorityModel, PriorityTier,
};

/// Rows per INSERT; keeps bound parameters under SQLite's limit.
const UPSERT_CHUNK_SIZE: usize = 80;

/// Metrics for one route as produced by a recomputation.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMetrics {
    pub route_id: i64,
    pub area_id: i64,
    pub ticks_14d: i32,
    pub ticks_90d: i32,
    pub ticks_total: i32,
    pub days_since_last_tick: Option<i32>,
    pub days_since_prior_tick: Option<i32>,
    pub area_percentile: f64,
    pub priority_tier: PriorityTier,
}

pub struct RoutePriorityRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> RoutePriorityRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Write all metrics in one transaction. `last_synced_at` survives recomputation.
    pub async fn upsert_metrics(
        &self,
        metrics: &[RouteMetrics],
        computed_at: DateTime<Utc>,
    ) -> RepositoryResult<u64> {
        let computed_at = computed_at.fixed_offset();
        let txn = self.db.begin().await?;
        let mut written = 0u64;

        for chunk in metrics.chunks(UPSERT_CHUNK_SIZE) {
            let models = chunk.iter().map(|m| PriorityActiveModel {
                route_id: Set(m.route_id),
                area_id: Set(m.area_id),
                ticks_14d: Set(m.ticks_14d),
                ticks_90d: Set(m.ticks_90d),
                ticks_total: Set(m.ticks_total),
                days_since_last_tick: Set(m.days_since_last_tick),
                days_since_prior_tick: Set(m.days_since_prior_tick),
                area_percentile: Set(m.area_percentile),
                priority_tier: Set(m.priority_tier),
                last_synced_at: Set(None),
                computed_at: Set(computed_at),
            });
            RoutePriority::insert_many(models)
                .on_conflict(
                    OnConflict::column(PriorityColumn::RouteId)
                        .update_columns([
                            PriorityColumn::AreaId,
                            PriorityColumn::Ticks14d,
                            PriorityColumn::Ticks90d,
                            PriorityColumn::TicksTotal,
                            PriorityColumn::DaysSinceLastTick,
                            PriorityColumn::DaysSincePriorTick,
                            PriorityColumn::AreaPercentile,
                            PriorityColumn::PriorityTier,
                            PriorityColumn::ComputedAt,
                        ])
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
            written += chunk.len() as u64;
        }

        txn.commit().await?;
        Ok(written)
    }

    /// Drop rows for routes whose area is bound to a Kaya location.
    pub async fn delete_location_bound(&self) -> RepositoryResult<u64> {
        let bound_areas = Query::select()
            .column(AreaColumn::Id)
            .from(MpArea)
            .and_where(AreaColumn::KayaLocationId.is_not_null())
            .to_owned();
        let result = RoutePriority::delete_many()
            .filter(PriorityColumn::AreaId.in_subquery(bound_areas))
            .exec(self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn get(&self, route_id: i64) -> RepositoryResult<Option<PriorityModel>> {
        Ok(RoutePriority::find_by_id(route_id).one(self.db).await?)
    }

    /// Routes of `tier` never synced or last synced before `synced_before`,
    /// never-synced first, then oldest first.
    pub async fn due_routes(
        &self,
        tier: PriorityTier,
        synced_before: DateTime<Utc>,
        limit: u64,
    ) -> RepositoryResult<Vec<PriorityModel>> {
        Ok(RoutePriority::find()
            .filter(PriorityColumn::PriorityTier.eq(tier))
            .filter(
                Condition::any()
                    .add(PriorityColumn::LastSyncedAt.is_null())
                    .add(PriorityColumn::LastSyncedAt.lt(synced_before.fixed_offset())),
            )
            .order_by_with_nulls(PriorityColumn::LastSyncedAt, Order::Asc, NullOrdering::First)
            .order_by_asc(PriorityColumn::RouteId)
            .limit(limit)
            .all(self.db)
            .await?)
    }

    pub async fn mark_route_synced(&self, route_id: i64, at: DateTime<Utc>) -> RepositoryResult<()> {
        let result = RoutePriority::update_many()
            .set(PriorityActiveModel {
                last_synced_at: Set(Some(at.fixed_offset())),
                ..Default::default()
            })
            .filter(PriorityColumn::RouteId.eq(route_id))
            .exec(self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(RepositoryError::not_found(format!("route priority {route_id}")));
        }
        Ok(())
    }
}
