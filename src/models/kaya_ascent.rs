//! KayaAscent entity model
//!
//! A logged ascent of a Kaya climb. The climb and user it references are upserted
//! alongside it when the payload embeds them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "kaya_ascents")]
pub struct Model {
    /// Kaya ascent identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Slug of the climb that was ascended
    pub climb_slug: String,

    pub user_id: Option<String>,

    /// Location the ascent was fetched under
    pub location_id: Option<String>,

    pub ascent_date: Option<DateTimeWithTimeZone>,
    pub grade: Option<String>,
    pub rating: Option<f64>,
    pub comment: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
