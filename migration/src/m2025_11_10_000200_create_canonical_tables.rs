//! Migration to create the canonical (MP) tables read by the pipeline.
//!
//! The canonical dataset is ingested by a separate process; these tables define the
//! shape the matcher and priority scheduler read from: areas, routes, and ticks.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MpAreas::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MpAreas::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MpAreas::Name).text().not_null())
                    .col(ColumnDef::new(MpAreas::ParentId).big_integer().null())
                    .col(ColumnDef::new(MpAreas::Latitude).double().null())
                    .col(ColumnDef::new(MpAreas::Longitude).double().null())
                    .col(ColumnDef::new(MpAreas::KayaLocationId).text().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MpRoutes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MpRoutes::Id)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MpRoutes::AreaId).big_integer().not_null())
                    .col(ColumnDef::new(MpRoutes::Name).text().not_null())
                    .col(ColumnDef::new(MpRoutes::RouteType).text().null())
                    .col(ColumnDef::new(MpRoutes::Grade).text().null())
                    .col(ColumnDef::new(MpRoutes::Latitude).double().null())
                    .col(ColumnDef::new(MpRoutes::Longitude).double().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mp_routes_area_id")
                            .from(MpRoutes::Table, MpRoutes::AreaId)
                            .to(MpAreas::Table, MpAreas::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_mp_routes_area_id")
                    .table(MpRoutes::Table)
                    .col(MpRoutes::AreaId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MpTicks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MpTicks::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MpTicks::RouteId).big_integer().not_null())
                    .col(
                        ColumnDef::new(MpTicks::TickDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_mp_ticks_route_id")
                            .from(MpTicks::Table, MpTicks::RouteId)
                            .to(MpRoutes::Table, MpRoutes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Activity aggregation scans ticks per route by date
        manager
            .create_index(
                Index::create()
                    .name("idx_mp_ticks_route_date")
                    .table(MpTicks::Table)
                    .col(MpTicks::RouteId)
                    .col(MpTicks::TickDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MpTicks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MpRoutes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MpAreas::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MpAreas {
    Table,
    Id,
    Name,
    ParentId,
    Latitude,
    Longitude,
    KayaLocationId,
}

#[derive(DeriveIden)]
enum MpRoutes {
    Table,
    Id,
    AreaId,
    Name,
    RouteType,
    Grade,
    Latitude,
    Longitude,
}

#[derive(DeriveIden)]
enum MpTicks {
    Table,
    Id,
    RouteId,
    TickDate,
}
