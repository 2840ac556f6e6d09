//! # Entity Matcher
//!
//! Links persisted Kaya climbs to canonical routes. For each route in an area a search
//! key (the longest significant token of its normalized name, or the whole normalized
//! name when every token is short) selects candidate climbs whose stored normalized
//! name contains it. Each candidate pair is scored from name similarity, location-label
//! overlap and GPS distance, and pairs at or above the caller's threshold are stored.

pub mod similarity;

use std::sync::Arc;

use metrics::counter;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::checkpoint::{CheckpointError, CheckpointState};
use crate::error::{RepositoryError, RepositoryResult};
use crate::job_tracker::JobTracker;
use crate::models::climb_match::MatchType;
use crate::models::job_execution::JobStatus;
use crate::models::kaya_climb::Model as ClimbModel;
use crate::models::mp_area::Model as AreaModel;
use crate::models::mp_route::Model as RouteModel;
use crate::progress::ProgressReporter;
use crate::repositories::{CanonicalRepository, KayaRepository, MatchRepository, NewMatch};

use similarity::{haversine_km, location_names_match, name_similarity, search_key};

pub const MATCH_ALL_JOB_NAME: &str = "kaya_mp_match_all";
const MATCH_ALL_JOB_TYPE: &str = "area_match";

const NAME_WEIGHT: f64 = 0.7;
const LOCATION_WEIGHT: f64 = 0.2;
const GPS_WEIGHT: f64 = 0.1;
/// Distance beyond which GPS contributes nothing.
const GPS_RADIUS_KM: f64 = 5.0;
const GPS_CLOSE_KM: f64 = 1.0;

/// Raw signals for one climb / route pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSignals {
    pub name_similarity: f64,
    pub location_match: bool,
    pub distance_km: Option<f64>,
}

impl MatchSignals {
    /// `0.7 * similarity + 0.2 * location + GPS bonus`, clamped to [0, 1].
    pub fn confidence(&self) -> f64 {
        let location = if self.location_match { 1.0 } else { 0.0 };
        let gps = match self.distance_km {
            Some(d) if d < GPS_RADIUS_KM => GPS_WEIGHT * (1.0 - d / GPS_RADIUS_KM),
            _ => 0.0,
        };
        (NAME_WEIGHT * self.name_similarity + LOCATION_WEIGHT * location + gps).clamp(0.0, 1.0)
    }

    pub fn match_type(&self) -> MatchType {
        let sim = self.name_similarity;
        let close = self.distance_km.is_some_and(|d| d < GPS_CLOSE_KM);
        if sim >= 1.0 {
            MatchType::ExactName
        } else if sim >= 0.9 && self.location_match {
            MatchType::FuzzyNameLocation
        } else if sim >= 0.85 {
            MatchType::FuzzyName
        } else if self.location_match && close {
            MatchType::LocationGpsProximity
        } else if self.location_match {
            MatchType::LocationName
        } else {
            MatchType::LowConfidence
        }
    }
}

/// Compute the signals between a climb and a route in `area`.
pub fn score_pair(
    climb: &ClimbModel,
    route: &RouteModel,
    area: &AreaModel,
    parent_area_name: Option<&str>,
) -> MatchSignals {
    let name_similarity = name_similarity(&climb.name, &route.name);
    let location_match = location_names_match(
        &[climb.area_name.as_deref(), climb.destination_name.as_deref()],
        &[Some(area.name.as_str()), parent_area_name],
    );

    let route_coords = match (route.latitude, route.longitude) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => area.latitude.zip(area.longitude),
    };
    let distance_km = match (climb.latitude.zip(climb.longitude), route_coords) {
        (Some((clat, clon)), Some((rlat, rlon))) => Some(haversine_km(clat, clon, rlat, rlon)),
        _ => None,
    };

    MatchSignals {
        name_similarity,
        location_match,
        distance_km,
    }
}

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("matching cancelled")]
    Cancelled,
}

/// Outcome of matching one area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub area_id: i64,
    pub routes: u32,
    pub candidates: u32,
    pub saved: u32,
}

/// Outcome of a full pass over every area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchAllSummary {
    pub job_id: uuid::Uuid,
    pub areas: u32,
    pub failed_areas: u32,
    pub matches_saved: u64,
    /// Whether the run continued an interrupted execution.
    pub resumed: bool,
}

/// Resume point of a full matching pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaMatchCheckpoint {
    pub last_area_id: Option<i64>,
    pub matches_saved: u64,
}

impl CheckpointState for AreaMatchCheckpoint {
    const KIND: &'static str = "area_match";
    const VERSION: u32 = 1;
}

pub struct EntityMatcher {
    db: DatabaseConnection,
    tracker: JobTracker,
    cancel: CancellationToken,
    progress_batch_size: u32,
}

impl EntityMatcher {
    pub fn new(db: DatabaseConnection) -> Self {
        let tracker = JobTracker::new(db.clone());
        Self {
            db,
            tracker,
            cancel: CancellationToken::new(),
            progress_batch_size: 10,
        }
    }

    pub fn with_tracker(mut self, tracker: JobTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress_batch_size(mut self, batch_size: u32) -> Self {
        self.progress_batch_size = batch_size;
        self
    }

    /// Score every candidate pair for the routes of `area_id` and store those at or
    /// above `min_confidence`.
    #[instrument(skip(self))]
    pub async fn match_area(&self, area_id: i64, min_confidence: f64) -> RepositoryResult<MatchSummary> {
        let canonical = CanonicalRepository::new(&self.db);
        let kaya = KayaRepository::new(&self.db);
        let matches = MatchRepository::new(&self.db);

        let area = canonical
            .find_area(area_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found(format!("area {area_id}")))?;
        let parent_name = canonical.parent_area_name(&area).await?;
        let routes = canonical.routes_in_area(area_id).await?;

        let mut summary = MatchSummary {
            area_id,
            ..Default::default()
        };

        for route in &routes {
            summary.routes += 1;
            let Some(key) = search_key(&route.name) else {
                debug!(route_id = route.id, name = %route.name, "Route name has nothing to match on");
                continue;
            };

            for climb in kaya.climbs_with_name_key(&key).await? {
                summary.candidates += 1;
                let signals = score_pair(&climb, route, &area, parent_name.as_deref());
                let confidence = signals.confidence();
                if confidence < min_confidence {
                    continue;
                }

                matches
                    .upsert_match(&NewMatch {
                        kaya_climb_slug: climb.slug.clone(),
                        mp_route_id: route.id,
                        confidence,
                        match_type: signals.match_type(),
                        name_similarity: signals.name_similarity,
                        location_match: signals.location_match,
                        distance_km: signals.distance_km,
                    })
                    .await?;
                summary.saved += 1;
            }
        }

        counter!("kaya_mp_matches_saved_total").increment(summary.saved as u64);
        info!(
            area_id,
            routes = summary.routes,
            candidates = summary.candidates,
            saved = summary.saved,
            "Area matched"
        );
        Ok(summary)
    }

    /// Match every area as a tracked job, resuming an interrupted run from its checkpoint.
    #[instrument(skip(self))]
    pub async fn match_all_areas(&self, min_confidence: f64) -> Result<MatchAllSummary, MatcherError> {
        let (job_id, checkpoint, resumed) = match self
            .tracker
            .get_interrupted_job(MATCH_ALL_JOB_NAME)
            .await?
        {
            Some(job) => {
                if job.status == JobStatus::Paused {
                    self.tracker.resume_job(job.id).await?;
                }
                let checkpoint = self
                    .tracker
                    .load_checkpoint::<AreaMatchCheckpoint>(job.id)
                    .await?
                    .unwrap_or_default();
                info!(job_id = %job.id, last_area_id = ?checkpoint.last_area_id, "Resuming area matching");
                (job.id, checkpoint, true)
            }
            None => {
                let job = self
                    .tracker
                    .start_job(MATCH_ALL_JOB_NAME, MATCH_ALL_JOB_TYPE, None, None)
                    .await?;
                (job.id, AreaMatchCheckpoint::default(), false)
            }
        };

        let area_ids = CanonicalRepository::new(&self.db)
            .area_ids_after(checkpoint.last_area_id)
            .await?;

        let mut reporter = ProgressReporter::new(
            Arc::new(self.tracker.clone()),
            job_id,
            None,
            self.progress_batch_size,
        );
        reporter.set_total(area_ids.len() as i32).await;

        let mut state = checkpoint;
        let mut summary = MatchAllSummary {
            job_id,
            resumed,
            ..Default::default()
        };

        for area_id in area_ids {
            if self.cancel.is_cancelled() {
                reporter.finish().await;
                if let Err(err) = self.tracker.mark_job_paused(job_id).await {
                    warn!(job_id = %job_id, error = %err, "Failed to pause matching job");
                }
                return Err(MatcherError::Cancelled);
            }

            match self.match_area(area_id, min_confidence).await {
                Ok(area) => {
                    state.matches_saved += area.saved as u64;
                    summary.areas += 1;
                    reporter.increment().await;
                }
                Err(err) => {
                    warn!(area_id, error = %err, "Area matching failed");
                    summary.failed_areas += 1;
                    reporter.increment_failed().await;
                }
            }

            state.last_area_id = Some(area_id);
            if let Err(err) = self.tracker.save_checkpoint(job_id, &state).await {
                warn!(job_id = %job_id, error = %err, "Failed to save matching checkpoint");
            }
        }

        reporter.finish().await;
        summary.matches_saved = state.matches_saved;
        self.tracker.complete_job(job_id).await?;
        info!(
            job_id = %job_id,
            areas = summary.areas,
            failed = summary.failed_areas,
            matches = summary.matches_saved,
            "Area matching completed"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_names_with_location_and_coincident_coords_score_high() {
        let signals = MatchSignals {
            name_similarity: 1.0,
            location_match: true,
            distance_km: Some(0.0),
        };
        assert!(signals.confidence() >= 0.95);
        assert_eq!(signals.match_type(), MatchType::ExactName);
    }

    #[test]
    fn name_only_is_bounded_by_weighted_similarity() {
        let signals = MatchSignals {
            name_similarity: 0.4,
            location_match: false,
            distance_km: None,
        };
        assert!(signals.confidence() <= 0.7 * 0.4 + f64::EPSILON);
        assert_eq!(signals.match_type(), MatchType::LowConfidence);
    }

    #[test]
    fn distant_coordinates_add_nothing() {
        let near = MatchSignals {
            name_similarity: 0.5,
            location_match: false,
            distance_km: Some(2.5),
        };
        let far = MatchSignals {
            distance_km: Some(12.0),
            ..near
        };
        assert!((near.confidence() - (0.35 + 0.05)).abs() < 1e-9);
        assert!((far.confidence() - 0.35).abs() < 1e-9);
    }

    #[test]
    fn type_cascade_order() {
        let base = MatchSignals {
            name_similarity: 0.92,
            location_match: true,
            distance_km: Some(0.3),
        };
        assert_eq!(base.match_type(), MatchType::FuzzyNameLocation);
        assert_eq!(
            MatchSignals { location_match: false, ..base }.match_type(),
            MatchType::FuzzyName
        );
        assert_eq!(
            MatchSignals { name_similarity: 0.5, ..base }.match_type(),
            MatchType::LocationGpsProximity
        );
        assert_eq!(
            MatchSignals { name_similarity: 0.5, distance_km: None, ..base }.match_type(),
            MatchType::LocationName
        );
    }

    #[test]
    fn confidence_stays_in_unit_interval() {
        for sim in [0.0, 0.3, 0.9, 1.0] {
            for loc in [false, true] {
                for d in [None, Some(0.0), Some(4.9), Some(100.0)] {
                    let c = MatchSignals {
                        name_similarity: sim,
                        location_match: loc,
                        distance_km: d,
                    }
                    .confidence();
                    assert!((0.0..=1.0).contains(&c));
                }
            }
        }
    }
}
