//! # Kaya Repository
//!
//! Idempotent persistence for data fetched from Kaya, plus the per-location
//! sync progress rows. Every write is an upsert keyed on Kaya's own identifiers.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};

use crate::error::{RepositoryError, RepositoryResult};
use crate::kaya::{Ascent, Climb, Location, User};
use crate::matcher::similarity::normalize_name;
use crate::models::kaya_ascent::{
    ActiveModel as AscentActiveModel, Column as AscentColumn, Entity as KayaAscent,
};
use crate::models::kaya_climb::{
    ActiveModel as ClimbActiveModel, Column as ClimbColumn, Entity as KayaClimb,
    Model as ClimbModel,
};
use crate::models::kaya_location::{
    ActiveModel as LocationActiveModel, Column as LocationColumn, Entity as KayaLocation,
    Model as LocationModel,
};
use crate::models::kaya_sync_progress::{
    ActiveModel as ProgressActiveModel, Column as ProgressColumn, Entity as KayaSyncProgress,
    Model as ProgressModel, SyncStatus,
};
use crate::models::kaya_user::{
    ActiveModel as UserActiveModel, Column as UserColumn, Entity as KayaUser,
};

/// Counters written when a location's sync attempt is finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub climbs: i32,
    pub ascents: i32,
    pub sub_locations: i32,
}

/// Repository for the `kaya_*` tables
pub struct KayaRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> KayaRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert or refresh a location by id.
    pub async fn upsert_location(&self, location: &Location) -> RepositoryResult<()> {
        if location.id.is_empty() || location.slug.is_empty() {
            return Err(RepositoryError::validation("location id and slug are required"));
        }
        let now = Utc::now().fixed_offset();
        let model = LocationActiveModel {
            id: Set(location.id.clone()),
            slug: Set(location.slug.clone()),
            name: Set(location.name.clone()),
            location_type: Set(location.location_type.clone()),
            parent_id: Set(location.parent_id.clone()),
            latitude: Set(location.latitude),
            longitude: Set(location.longitude),
            climb_count: Set(location.climb_count),
            ascent_count: Set(location.ascent_count),
            description: Set(location.description.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        KayaLocation::insert(model)
            .on_conflict(
                OnConflict::column(LocationColumn::Id)
                    .update_columns([
                        LocationColumn::Slug,
                        LocationColumn::Name,
                        LocationColumn::LocationType,
                        LocationColumn::ParentId,
                        LocationColumn::Latitude,
                        LocationColumn::Longitude,
                        LocationColumn::ClimbCount,
                        LocationColumn::AscentCount,
                        LocationColumn::Description,
                        LocationColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db)
            .await?;
        Ok(())
    }

    /// Insert or refresh a climb by slug. `location_id` fills in a missing location.
    pub async fn upsert_climb(&self, climb: &Climb, location_id: Option<&str>) -> RepositoryResult<()> {
        upsert_climb_on(self.db, climb, location_id).await
    }

    pub async fn upsert_user(&self, user: &User) -> RepositoryResult<()> {
        upsert_user_on(self.db, user).await
    }

    /// Persist an ascent together with its embedded climb and user in one transaction.
    ///
    /// Ascents without a resolvable climb slug are rejected.
    pub async fn upsert_ascent(&self, ascent: &Ascent, location_id: &str) -> RepositoryResult<()> {
        let Some(climb_slug) = ascent.resolved_climb_slug().map(str::to_string) else {
            return Err(RepositoryError::validation(format!(
                "ascent {} has no climb slug",
                ascent.id
            )));
        };
        if ascent.id.is_empty() {
            return Err(RepositoryError::validation("ascent id is required"));
        }

        let txn = self.db.begin().await?;

        if let Some(user) = &ascent.user {
            upsert_user_on(&txn, user).await?;
        }
        if let Some(climb) = &ascent.climb {
            upsert_climb_on(&txn, climb, Some(location_id)).await?;
        }

        let now = Utc::now().fixed_offset();
        let model = AscentActiveModel {
            id: Set(ascent.id.clone()),
            climb_slug: Set(climb_slug),
            user_id: Set(ascent.user.as_ref().map(|u| u.id.clone())),
            location_id: Set(Some(location_id.to_string())),
            ascent_date: Set(ascent.date.map(|d| d.fixed_offset())),
            grade: Set(ascent.grade.clone()),
            rating: Set(ascent.rating),
            comment: Set(ascent.comment.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        KayaAscent::insert(model)
            .on_conflict(
                OnConflict::column(AscentColumn::Id)
                    .update_columns([
                        AscentColumn::ClimbSlug,
                        AscentColumn::UserId,
                        AscentColumn::LocationId,
                        AscentColumn::AscentDate,
                        AscentColumn::Grade,
                        AscentColumn::Rating,
                        AscentColumn::Comment,
                        AscentColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(())
    }

    pub async fn find_location_by_slug(&self, slug: &str) -> RepositoryResult<Option<LocationModel>> {
        Ok(KayaLocation::find()
            .filter(LocationColumn::Slug.eq(slug))
            .one(self.db)
            .await?)
    }

    pub async fn find_climb(&self, slug: &str) -> RepositoryResult<Option<ClimbModel>> {
        Ok(KayaClimb::find_by_id(slug.to_string()).one(self.db).await?)
    }

    /// Climbs whose normalized name contains `key`.
    ///
    /// `key` must already be normalized; it then carries no `LIKE` wildcards.
    pub async fn climbs_with_name_key(&self, key: &str) -> RepositoryResult<Vec<ClimbModel>> {
        Ok(KayaClimb::find()
            .filter(ClimbColumn::NormalizedName.contains(key))
            .order_by_asc(ClimbColumn::Slug)
            .all(self.db)
            .await?)
    }

    /// Mark a location `in_progress` and reset its counters for a new attempt.
    pub async fn start_sync_progress(&self, location_id: &str) -> RepositoryResult<()> {
        let now = Utc::now().fixed_offset();
        let model = ProgressActiveModel {
            location_id: Set(location_id.to_string()),
            status: Set(SyncStatus::InProgress),
            last_sync_at: NotSet,
            next_sync_at: NotSet,
            last_error: Set(None),
            climbs_synced: Set(0),
            ascents_synced: Set(0),
            sub_locations_synced: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        KayaSyncProgress::insert(model)
            .on_conflict(
                OnConflict::column(ProgressColumn::LocationId)
                    .update_columns([
                        ProgressColumn::Status,
                        ProgressColumn::LastError,
                        ProgressColumn::ClimbsSynced,
                        ProgressColumn::AscentsSynced,
                        ProgressColumn::SubLocationsSynced,
                        ProgressColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db)
            .await?;
        Ok(())
    }

    /// Record the outcome of an attempt: `completed` without an error, `failed` otherwise.
    pub async fn finalize_sync_progress(
        &self,
        location_id: &str,
        error: Option<&str>,
        counts: SyncCounts,
        next_sync_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let now = Utc::now().fixed_offset();
        let status = if error.is_some() {
            SyncStatus::Failed
        } else {
            SyncStatus::Completed
        };

        let result = KayaSyncProgress::update_many()
            .set(ProgressActiveModel {
                status: Set(status),
                last_sync_at: Set(Some(now)),
                next_sync_at: Set(Some(next_sync_at.fixed_offset())),
                last_error: Set(error.map(str::to_string)),
                climbs_synced: Set(counts.climbs),
                ascents_synced: Set(counts.ascents),
                sub_locations_synced: Set(counts.sub_locations),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(ProgressColumn::LocationId.eq(location_id))
            .filter(ProgressColumn::Status.eq(SyncStatus::InProgress))
            .exec(self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::not_found(format!(
                "in-progress sync for location {location_id}"
            )));
        }
        Ok(())
    }

    pub async fn get_sync_progress(&self, location_id: &str) -> RepositoryResult<Option<ProgressModel>> {
        Ok(KayaSyncProgress::find_by_id(location_id.to_string())
            .one(self.db)
            .await?)
    }
}

async fn upsert_climb_on<C: ConnectionTrait>(
    conn: &C,
    climb: &Climb,
    location_id: Option<&str>,
) -> RepositoryResult<()> {
    if climb.slug.is_empty() {
        return Err(RepositoryError::validation("climb slug is required"));
    }
    let now = Utc::now().fixed_offset();
    let model = ClimbActiveModel {
        slug: Set(climb.slug.clone()),
        name: Set(climb.name.clone()),
        normalized_name: Set(normalize_name(&climb.name)),
        grade: Set(climb.grade.clone()),
        climb_type: Set(climb.climb_type.clone()),
        location_id: Set(climb
            .location_id
            .clone()
            .or_else(|| location_id.map(str::to_string))),
        area_name: Set(climb.area_name.clone()),
        destination_name: Set(climb.destination_name.clone()),
        latitude: Set(climb.latitude),
        longitude: Set(climb.longitude),
        rating: Set(climb.rating),
        ascent_count: Set(climb.ascent_count),
        created_at: Set(now),
        updated_at: Set(now),
    };
    KayaClimb::insert(model)
        .on_conflict(
            OnConflict::column(ClimbColumn::Slug)
                .update_columns([
                    ClimbColumn::Name,
                    ClimbColumn::NormalizedName,
                    ClimbColumn::Grade,
                    ClimbColumn::ClimbType,
                    ClimbColumn::LocationId,
                    ClimbColumn::AreaName,
                    ClimbColumn::DestinationName,
                    ClimbColumn::Latitude,
                    ClimbColumn::Longitude,
                    ClimbColumn::Rating,
                    ClimbColumn::AscentCount,
                    ClimbColumn::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

async fn upsert_user_on<C: ConnectionTrait>(conn: &C, user: &User) -> RepositoryResult<()> {
    if user.id.is_empty() {
        return Err(RepositoryError::validation("user id is required"));
    }
    let now = Utc::now().fixed_offset();
    let model = UserActiveModel {
        id: Set(user.id.clone()),
        username: Set(user.username.clone()),
        display_name: Set(user.display_name.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    };
    KayaUser::insert(model)
        .on_conflict(
            OnConflict::column(UserColumn::Id)
                .update_columns([UserColumn::Username, UserColumn::DisplayName, UserColumn::UpdatedAt])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}
