//! KayaSyncProgress entity model
//!
//! One row per Kaya location recording the outcome of its most recent sync attempt.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "kaya_sync_progress")]
pub struct Model {
    /// Kaya location identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub location_id: String,

    pub status: SyncStatus,

    /// When the last attempt finished
    pub last_sync_at: Option<DateTimeWithTimeZone>,

    /// When the location is next due; a fixed cadence after `last_sync_at`
    pub next_sync_at: Option<DateTimeWithTimeZone>,

    /// First error retained by the last attempt
    pub last_error: Option<String>,

    pub climbs_synced: i32,
    pub ascents_synced: i32,
    pub sub_locations_synced: i32,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

/// Sync status; moves `pending -> in_progress -> {completed, failed}`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,

    #[sea_orm(string_value = "in_progress")]
    InProgress,

    #[sea_orm(string_value = "completed")]
    Completed,

    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
