//! RoutePriority entity model
//!
//! Rolling activity metrics and the assigned re-sync tier for one canonical route.
//! Rows are rewritten in bulk by each priority recomputation.

use std::{fmt, str::FromStr};

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "route_priorities")]
pub struct Model {
    /// Canonical route identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub route_id: i64,

    pub area_id: i64,

    /// Ticks in the trailing 14 days
    #[sea_orm(column_name = "ticks_14d")]
    pub ticks_14d: i32,

    /// Ticks in the trailing 90 days
    #[sea_orm(column_name = "ticks_90d")]
    pub ticks_90d: i32,

    pub ticks_total: i32,

    /// Whole days since the most recent tick, `None` if never ticked
    pub days_since_last_tick: Option<i32>,

    /// Whole days since the most recent tick older than the 14-day window
    pub days_since_prior_tick: Option<i32>,

    /// Percent rank (0-100) of `ticks_90d` among routes in the same area
    pub area_percentile: f64,

    pub priority_tier: PriorityTier,

    /// Last time the route was re-synced against the external platform
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    pub computed_at: DateTimeWithTimeZone,
}

/// Re-sync priority tier.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    #[sea_orm(string_value = "high")]
    High,

    #[sea_orm(string_value = "medium")]
    Medium,

    #[sea_orm(string_value = "low")]
    #[default]
    Low,
}

impl PriorityTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for PriorityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriorityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown priority tier '{other}'")),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
