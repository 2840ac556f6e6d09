//! KayaLocation entity model
//!
//! A location (crag, area or region) as published by the Kaya platform.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "kaya_locations")]
pub struct Model {
    /// Kaya location identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// URL slug used to address the location
    #[sea_orm(unique)]
    pub slug: String,

    pub name: String,

    /// Kaya's own location classification (e.g. `destination`, `area`)
    pub location_type: Option<String>,

    /// Parent location identifier, if any
    pub parent_id: Option<String>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub climb_count: Option<i32>,
    pub ascent_count: Option<i32>,
    pub description: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
