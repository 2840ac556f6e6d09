//! MpArea entity model
//!
//! Canonical area. Populated by the canonical ingestion process; read-only here.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "mp_areas")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    pub name: String,

    /// Parent area, `None` for top-level areas
    pub parent_id: Option<i64>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    /// Set when the area is bound to a Kaya location; its routes then sync with the location
    pub kaya_location_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::mp_route::Entity")]
    Routes,
}

impl Related<super::mp_route::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Routes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
