//! # Canonical Repository
//!
//! Read-only access to the canonical `mp_areas` / `mp_routes` tables.

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::error::RepositoryResult;
use crate::models::mp_area::{Column as AreaColumn, Entity as MpArea, Model as AreaModel};
use crate::models::mp_route::{Column as RouteColumn, Entity as MpRoute, Model as RouteModel};

pub struct CanonicalRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> CanonicalRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn find_area(&self, area_id: i64) -> RepositoryResult<Option<AreaModel>> {
        Ok(MpArea::find_by_id(area_id).one(self.db).await?)
    }

    /// Name of the area's parent, if it has one.
    pub async fn parent_area_name(&self, area: &AreaModel) -> RepositoryResult<Option<String>> {
        let Some(parent_id) = area.parent_id else {
            return Ok(None);
        };
        Ok(self.find_area(parent_id).await?.map(|parent| parent.name))
    }

    pub async fn routes_in_area(&self, area_id: i64) -> RepositoryResult<Vec<RouteModel>> {
        Ok(MpRoute::find()
            .filter(RouteColumn::AreaId.eq(area_id))
            .order_by_asc(RouteColumn::Id)
            .all(self.db)
            .await?)
    }

    /// Every area id in ascending order, optionally starting after `after`.
    pub async fn area_ids_after(&self, after: Option<i64>) -> RepositoryResult<Vec<i64>> {
        let mut query = MpArea::find()
            .select_only()
            .column(AreaColumn::Id)
            .order_by_asc(AreaColumn::Id);
        if let Some(after) = after {
            query = query.filter(AreaColumn::Id.gt(after));
        }
        Ok(query.into_tuple::<i64>().all(self.db).await?)
    }
}
