//! Migration to create the route_priorities table.
//!
//! Holds the rolling activity metrics and assigned re-sync tier for each canonical route,
//! rewritten in bulk by the priority scheduler, plus the last time the route was re-synced.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RoutePriorities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RoutePriorities::RouteId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::AreaId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::Ticks14d)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::Ticks90d)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::TicksTotal)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::DaysSinceLastTick)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::DaysSincePriorTick)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::AreaPercentile)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::PriorityTier)
                            .text()
                            .not_null()
                            .default("low"),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(RoutePriorities::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // "Due" queries select one tier ordered by staleness
        manager
            .create_index(
                Index::create()
                    .name("idx_route_priorities_tier_last_synced")
                    .table(RoutePriorities::Table)
                    .col(RoutePriorities::PriorityTier)
                    .col(RoutePriorities::LastSyncedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_route_priorities_tier_last_synced")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(RoutePriorities::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RoutePriorities {
    Table,
    RouteId,
    AreaId,
    #[sea_orm(iden = "ticks_14d")]
    Ticks14d,
    #[sea_orm(iden = "ticks_90d")]
    Ticks90d,
    TicksTotal,
    DaysSinceLastTick,
    DaysSincePriorTick,
    AreaPercentile,
    PriorityTier,
    LastSyncedAt,
    ComputedAt,
}
