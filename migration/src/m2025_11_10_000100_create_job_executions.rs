//! Migration to create the job_executions table.
//!
//! Every long-running batch task (location syncs, priority recomputation, area matching)
//! records its lifecycle here: status, item counters, timing, and a JSON metadata bag that
//! holds checkpoints for crash recovery.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobExecutions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobExecutions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobExecutions::JobName).text().not_null())
                    .col(ColumnDef::new(JobExecutions::JobType).text().not_null())
                    .col(
                        ColumnDef::new(JobExecutions::Status)
                            .text()
                            .not_null()
                            .default("running"),
                    )
                    .col(ColumnDef::new(JobExecutions::TotalItems).integer().null())
                    .col(
                        ColumnDef::new(JobExecutions::ProcessedItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(JobExecutions::SucceededItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(JobExecutions::FailedItems)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(JobExecutions::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(JobExecutions::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(JobExecutions::ErrorMessage).text().null())
                    .col(ColumnDef::new(JobExecutions::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(JobExecutions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(JobExecutions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Recovery lookups filter by name and status, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_job_executions_name_status_started")
                    .table(JobExecutions::Table)
                    .col(JobExecutions::JobName)
                    .col(JobExecutions::Status)
                    .col(JobExecutions::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_job_executions_name_status_started")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(JobExecutions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum JobExecutions {
    Table,
    Id,
    JobName,
    JobType,
    Status,
    TotalItems,
    ProcessedItems,
    SucceededItems,
    FailedItems,
    StartedAt,
    CompletedAt,
    ErrorMessage,
    Metadata,
    CreatedAt,
    UpdatedAt,
}
