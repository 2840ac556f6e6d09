//! Kaya payload types, limited to the fields the pipeline persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: String,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub location_type: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub climb_count: Option<i32>,
    #[serde(default)]
    pub ascent_count: Option<i32>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Climb {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub climb_type: Option<String>,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub area_name: Option<String>,
    #[serde(default)]
    pub destination_name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub ascent_count: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A logged ascent. The climb and user are embedded when Kaya includes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ascent {
    pub id: String,
    #[serde(default)]
    pub climb_slug: Option<String>,
    #[serde(default)]
    pub climb: Option<Climb>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl Ascent {
    /// Slug of the ascended climb, from the explicit field or the embedded climb.
    pub fn resolved_climb_slug(&self) -> Option<&str> {
        self.climb_slug
            .as_deref()
            .or_else(|| self.climb.as_ref().map(|c| c.slug.as_str()))
            .filter(|slug| !slug.is_empty())
    }
}

/// The two climb categories fetched for every location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClimbCategory {
    Boulder,
    Route,
}

impl ClimbCategory {
    pub const ALL: [ClimbCategory; 2] = [ClimbCategory::Boulder, ClimbCategory::Route];

    /// Value sent as Kaya's type filter.
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Boulder => "boulder",
            Self::Route => "route",
        }
    }
}
