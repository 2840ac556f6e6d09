//! ClimbMatch entity model
//!
//! A scored link between a Kaya climb and a canonical route, keyed on the pair.

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "kaya_mp_matches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub kaya_climb_slug: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub mp_route_id: i64,

    /// Weighted combination of the signals below, in [0, 1]
    pub confidence: f64,

    pub match_type: MatchType,

    /// Normalized edit-distance similarity of the two names
    pub name_similarity: f64,

    /// Whether the location labels overlap
    pub location_match: bool,

    /// Great-circle distance between the two, when both have coordinates
    pub distance_km: Option<f64>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

/// How a pair was matched, from strongest to weakest evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[sea_orm(string_value = "exact_name")]
    ExactName,

    #[sea_orm(string_value = "fuzzy_name_location")]
    FuzzyNameLocation,

    #[sea_orm(string_value = "fuzzy_name")]
    FuzzyName,

    #[sea_orm(string_value = "location_gps_proximity")]
    LocationGpsProximity,

    #[sea_orm(string_value = "location_name")]
    LocationName,

    #[sea_orm(string_value = "low_confidence")]
    LowConfidence,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ExactName => "exact_name",
            Self::FuzzyNameLocation => "fuzzy_name_location",
            Self::FuzzyName => "fuzzy_name",
            Self::LocationGpsProximity => "location_gps_proximity",
            Self::LocationName => "location_name",
            Self::LowConfidence => "low_confidence",
        };
        f.write_str(label)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
