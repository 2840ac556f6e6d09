//! KayaClimb entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// A climb as published by Kaya, keyed by its slug and independent of the canonical
/// hierarchy until matched.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "kaya_climbs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub slug: String,
    pub name: String,
    /// Name as compared by the matcher; candidate lookups run against this column
    pub normalized_name: String,
    pub grade: Option<String>,
    /// `boulder` or `route`
    pub climb_type: Option<String>,
    pub location_id: Option<String>,
    pub area_name: Option<String>,
    pub destination_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rating: Option<f64>,
    pub ascent_count: Option<i32>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
