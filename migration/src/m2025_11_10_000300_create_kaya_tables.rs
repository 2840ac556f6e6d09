//! Migration to create the tables holding data synced from Kaya.
//!
//! Locations, climbs, users and ascents are keyed on their Kaya identifiers so that
//! every write is an upsert. Rows deliberately carry no foreign keys between each other:
//! an ascent can embed a climb whose location has not been synced yet.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KayaLocations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KayaLocations::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(KayaLocations::Slug)
                            .text()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(KayaLocations::Name).text().not_null())
                    .col(ColumnDef::new(KayaLocations::LocationType).text().null())
                    .col(ColumnDef::new(KayaLocations::ParentId).text().null())
                    .col(ColumnDef::new(KayaLocations::Latitude).double().null())
                    .col(ColumnDef::new(KayaLocations::Longitude).double().null())
                    .col(ColumnDef::new(KayaLocations::ClimbCount).integer().null())
                    .col(ColumnDef::new(KayaLocations::AscentCount).integer().null())
                    .col(ColumnDef::new(KayaLocations::Description).text().null())
                    .col(timestamp(KayaLocations::CreatedAt))
                    .col(timestamp(KayaLocations::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(KayaClimbs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KayaClimbs::Slug)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KayaClimbs::Name).text().not_null())
                    .col(ColumnDef::new(KayaClimbs::NormalizedName).text().not_null())
                    .col(ColumnDef::new(KayaClimbs::Grade).text().null())
                    .col(ColumnDef::new(KayaClimbs::ClimbType).text().null())
                    .col(ColumnDef::new(KayaClimbs::LocationId).text().null())
                    .col(ColumnDef::new(KayaClimbs::AreaName).text().null())
                    .col(ColumnDef::new(KayaClimbs::DestinationName).text().null())
                    .col(ColumnDef::new(KayaClimbs::Latitude).double().null())
                    .col(ColumnDef::new(KayaClimbs::Longitude).double().null())
                    .col(ColumnDef::new(KayaClimbs::Rating).double().null())
                    .col(ColumnDef::new(KayaClimbs::AscentCount).integer().null())
                    .col(timestamp(KayaClimbs::CreatedAt))
                    .col(timestamp(KayaClimbs::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_kaya_climbs_location_id")
                    .table(KayaClimbs::Table)
                    .col(KayaClimbs::LocationId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(KayaUsers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KayaUsers::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KayaUsers::Username).text().not_null())
                    .col(ColumnDef::new(KayaUsers::DisplayName).text().null())
                    .col(timestamp(KayaUsers::CreatedAt))
                    .col(timestamp(KayaUsers::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(KayaAscents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KayaAscents::Id)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(KayaAscents::ClimbSlug).text().not_null())
                    .col(ColumnDef::new(KayaAscents::UserId).text().null())
                    .col(ColumnDef::new(KayaAscents::LocationId).text().null())
                    .col(
                        ColumnDef::new(KayaAscents::AscentDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(KayaAscents::Grade).text().null())
                    .col(ColumnDef::new(KayaAscents::Rating).double().null())
                    .col(ColumnDef::new(KayaAscents::Comment).text().null())
                    .col(timestamp(KayaAscents::CreatedAt))
                    .col(timestamp(KayaAscents::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_kaya_ascents_climb_slug")
                    .table(KayaAscents::Table)
                    .col(KayaAscents::ClimbSlug)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(KayaSyncProgress::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(KayaSyncProgress::LocationId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(KayaSyncProgress::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(KayaSyncProgress::LastSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(KayaSyncProgress::NextSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(KayaSyncProgress::LastError).text().null())
                    .col(
                        ColumnDef::new(KayaSyncProgress::ClimbsSynced)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(KayaSyncProgress::AscentsSynced)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(KayaSyncProgress::SubLocationsSynced)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(timestamp(KayaSyncProgress::CreatedAt))
                    .col(timestamp(KayaSyncProgress::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(KayaSyncProgress::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(KayaAscents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(KayaUsers::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(KayaClimbs::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(KayaLocations::Table).to_owned())
            .await
    }
}

fn timestamp<T: IntoIden>(column: T) -> ColumnDef {
    ColumnDef::new(column)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(DeriveIden)]
enum KayaLocations {
    Table,
    Id,
    Slug,
    Name,
    LocationType,
    ParentId,
    Latitude,
    Longitude,
    ClimbCount,
    AscentCount,
    Description,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum KayaClimbs {
    Table,
    Slug,
    Name,
    NormalizedName,
    Grade,
    ClimbType,
    LocationId,
    AreaName,
    DestinationName,
    Latitude,
    Longitude,
    Rating,
    AscentCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum KayaUsers {
    Table,
    Id,
    Username,
    DisplayName,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum KayaAscents {
    Table,
    Id,
    ClimbSlug,
    UserId,
    LocationId,
    AscentDate,
    Grade,
    Rating,
    Comment,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum KayaSyncProgress {
    Table,
    LocationId,
    Status,
    LastSyncAt,
    NextSyncAt,
    LastError,
    ClimbsSynced,
    AscentsSynced,
    SubLocationsSynced,
    CreatedAt,
    UpdatedAt,
}
