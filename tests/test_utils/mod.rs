//! Test utilities for database testing.
//!
//! In-memory SQLite databases with migrations applied, plus fixture helpers for the
//! canonical tables and Kaya payloads.
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use climb_sync::kaya::{Ascent, Climb, Location, User};
use climb_sync::models::{mp_area, mp_route, mp_tick};
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, NotSet, Set, Statement,
};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;

    // Fixtures insert ticks and routes without always creating their parents.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

pub async fn insert_area(
    db: &DatabaseConnection,
    id: i64,
    name: &str,
    parent_id: Option<i64>,
    coords: Option<(f64, f64)>,
    kaya_location_id: Option<&str>,
) -> Result<mp_area::Model> {
    Ok(mp_area::ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        parent_id: Set(parent_id),
        latitude: Set(coords.map(|c| c.0)),
        longitude: Set(coords.map(|c| c.1)),
        kaya_location_id: Set(kaya_location_id.map(str::to_string)),
    }
    .insert(db)
    .await?)
}

pub async fn insert_route(
    db: &DatabaseConnection,
    id: i64,
    area_id: i64,
    name: &str,
    route_type: Option<&str>,
    coords: Option<(f64, f64)>,
) -> Result<mp_route::Model> {
    Ok(mp_route::ActiveModel {
        id: Set(id),
        area_id: Set(area_id),
        name: Set(name.to_string()),
        route_type: Set(route_type.map(str::to_string)),
        grade: Set(None),
        latitude: Set(coords.map(|c| c.0)),
        longitude: Set(coords.map(|c| c.1)),
    }
    .insert(db)
    .await?)
}

/// Insert one tick per entry in `days_ago`, relative to `now`.
pub async fn insert_ticks(
    db: &DatabaseConnection,
    route_id: i64,
    now: DateTime<Utc>,
    days_ago: &[i64],
) -> Result<()> {
    for days in days_ago {
        mp_tick::ActiveModel {
            id: NotSet,
            route_id: Set(route_id),
            tick_date: Set((now - Duration::days(*days)).fixed_offset()),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

pub fn location(id: &str, slug: &str) -> Location {
    Location {
        id: id.to_string(),
        slug: slug.to_string(),
        name: format!("Location {slug}"),
        location_type: Some("area".to_string()),
        parent_id: None,
        latitude: None,
        longitude: None,
        climb_count: None,
        ascent_count: None,
        description: None,
    }
}

pub fn climb(slug: &str, name: &str) -> Climb {
    Climb {
        slug: slug.to_string(),
        name: name.to_string(),
        grade: Some("V4".to_string()),
        climb_type: Some("boulder".to_string()),
        location_id: None,
        area_name: None,
        destination_name: None,
        latitude: None,
        longitude: None,
        rating: None,
        ascent_count: None,
    }
}

pub fn ascent(id: &str, climb_slug: &str, user_id: &str) -> Ascent {
    Ascent {
        id: id.to_string(),
        climb_slug: Some(climb_slug.to_string()),
        climb: None,
        user: Some(User {
            id: user_id.to_string(),
            username: format!("user-{user_id}"),
            display_name: None,
        }),
        date: Some(Utc::now()),
        grade: None,
        rating: None,
        comment: None,
    }
}
