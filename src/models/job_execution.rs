//! JobExecution entity model
//!
//! This module contains the SeaORM entity model for the job_executions table,
//! the durable lifecycle record of every long-running batch task.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// JobExecution entity recording one run of a named batch task
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "job_executions")]
pub struct Model {
    /// Unique identifier for the execution (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Stable name of the job (e.g. `kaya_location_sync:red-rock`), used for recovery lookups
    pub job_name: String,

    /// Category of work (e.g. `location_sync`, `priority_recompute`, `area_match`)
    pub job_type: String,

    /// Current lifecycle status
    pub status: JobStatus,

    /// Total number of items, once known
    pub total_items: Option<i32>,

    /// Items processed so far; never exceeds `total_items` when that is set
    pub processed_items: i32,

    /// Items processed successfully
    pub succeeded_items: i32,

    /// Items that failed
    pub failed_items: i32,

    /// Timestamp when the execution started
    pub started_at: DateTimeWithTimeZone,

    /// Timestamp when the execution reached a terminal status
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Error message recorded on failure or cancellation
    pub error_message: Option<String>,

    /// Free-form metadata holding checkpoints and the current item pointer
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Option<JsonValue>,

    /// Timestamp when the row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last updated
    pub updated_at: DateTimeWithTimeZone,
}

/// Lifecycle status of a job execution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[sea_orm(string_value = "running")]
    #[default]
    Running,

    #[sea_orm(string_value = "completed")]
    Completed,

    #[sea_orm(string_value = "failed")]
    Failed,

    #[sea_orm(string_value = "paused")]
    Paused,

    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl JobStatus {
    /// Completed, failed and cancelled executions never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Statuses a crashed or paused job can be left in and later resumed from.
    pub fn resumable() -> [JobStatus; 2] {
        [Self::Running, Self::Paused]
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
