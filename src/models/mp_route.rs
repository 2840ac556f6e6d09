//! MpRoute entity model
//!
//! Canonical route belonging to an area. Read-only here.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "mp_routes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub area_id: i64,
    pub name: String,
    /// Comma-separated discipline list as published (e.g. `Trad, Alpine`)
    pub route_type: Option<String>,
    pub grade: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::mp_area::Entity",
        from = "Column::AreaId",
        to = "super::mp_area::Column::Id"
    )]
    Area,

    #[sea_orm(has_many = "super::mp_tick::Entity")]
    Ticks,
}

impl Related<super::mp_area::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Area.def()
    }
}

impl Related<super::mp_tick::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ticks.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
