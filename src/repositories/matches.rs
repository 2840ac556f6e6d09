//! # Match Repository
//!
//! Persists Kaya climb / canonical route matches keyed on the pair.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};

use crate::error::{RepositoryError, RepositoryResult};
use crate::models::climb_match::{
    ActiveModel as MatchActiveModel, Column as MatchColumn, Entity as ClimbMatch, MatchType,
    Model as MatchModel,
};

/// Scored pair ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub kaya_climb_slug: String,
    pub mp_route_id: i64,
    pub confidence: f64,
    pub match_type: MatchType,
    pub name_similarity: f64,
    pub location_match: bool,
    pub distance_km: Option<f64>,
}

pub struct MatchRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> MatchRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert the pair or refresh its scores; `created_at` is kept on update.
    pub async fn upsert_match(&self, new: &NewMatch) -> RepositoryResult<()> {
        if !(0.0..=1.0).contains(&new.confidence) {
            return Err(RepositoryError::validation(format!(
                "confidence {} outside [0, 1]",
                new.confidence
            )));
        }
        let now = Utc::now().fixed_offset();
        let model = MatchActiveModel {
            kaya_climb_slug: Set(new.kaya_climb_slug.clone()),
            mp_route_id: Set(new.mp_route_id),
            confidence: Set(new.confidence),
            match_type: Set(new.match_type),
            name_similarity: Set(new.name_similarity),
            location_match: Set(new.location_match),
            distance_km: Set(new.distance_km),
            created_at: Set(now),
            updated_at: Set(now),
        };
        ClimbMatch::insert(model)
            .on_conflict(
                OnConflict::columns([MatchColumn::KayaClimbSlug, MatchColumn::MpRouteId])
                    .update_columns([
                        MatchColumn::Confidence,
                        MatchColumn::MatchType,
                        MatchColumn::NameSimilarity,
                        MatchColumn::LocationMatch,
                        MatchColumn::DistanceKm,
                        MatchColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db)
            .await?;
        Ok(())
    }

    pub async fn matches_for_route(&self, route_id: i64) -> RepositoryResult<Vec<MatchModel>> {
        Ok(ClimbMatch::find()
            .filter(MatchColumn::MpRouteId.eq(route_id))
            .order_by_desc(MatchColumn::Confidence)
            .all(self.db)
            .await?)
    }

    pub async fn count(&self) -> RepositoryResult<u64> {
        Ok(ClimbMatch::find().count(self.db).await?)
    }
}
