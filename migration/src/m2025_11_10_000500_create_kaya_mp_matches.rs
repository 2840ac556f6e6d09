//! Migration to create the kaya_mp_matches table.
//!
//! One row per (Kaya climb, MP route) pair scored by the entity matcher. The pair is the
//! primary key so re-running the matcher converges instead of duplicating rows.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(KayaMpMatches::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(KayaMpMatches::KayaClimbSlug).text().not_null())
                    .col(
                        ColumnDef::new(KayaMpMatches::MpRouteId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(KayaMpMatches::Confidence).double().not_null())
                    .col(ColumnDef::new(KayaMpMatches::MatchType).text().not_null())
                    .col(
                        ColumnDef::new(KayaMpMatches::NameSimilarity)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(KayaMpMatches::LocationMatch)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(KayaMpMatches::DistanceKm).double().null())
                    .col(
                        ColumnDef::new(KayaMpMatches::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(KayaMpMatches::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_kaya_mp_matches")
                            .col(KayaMpMatches::KayaClimbSlug)
                            .col(KayaMpMatches::MpRouteId),
                    )
                    .to_owned(),
            )
            .await?;

        // Read queries join from the canonical side
        manager
            .create_index(
                Index::create()
                    .name("idx_kaya_mp_matches_route")
                    .table(KayaMpMatches::Table)
                    .col(KayaMpMatches::MpRouteId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_kaya_mp_matches_route").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(KayaMpMatches::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum KayaMpMatches {
    Table,
    KayaClimbSlug,
    MpRouteId,
    Confidence,
    MatchType,
    NameSimilarity,
    LocationMatch,
    DistanceKm,
    CreatedAt,
    UpdatedAt,
}
