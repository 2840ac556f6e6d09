mod test_utils;

use anyhow::Result;
use climb_sync::job_tracker::JobTracker;
use climb_sync::kaya::Climb;
use climb_sync::matcher::{AreaMatchCheckpoint, EntityMatcher, MATCH_ALL_JOB_NAME};
use climb_sync::models::climb_match::MatchType;
use climb_sync::models::job_execution::JobStatus;
use climb_sync::repositories::{KayaRepository, MatchRepository};
use test_utils::{climb, insert_area, insert_route, setup_test_db};

fn climb_at(slug: &str, name: &str, area: Option<&str>, coords: Option<(f64, f64)>) -> Climb {
    Climb {
        area_name: area.map(str::to_string),
        latitude: coords.map(|c| c.0),
        longitude: coords.map(|c| c.1),
        ..climb(slug, name)
    }
}

async fn seed_red_rock(db: &sea_orm::DatabaseConnection) -> Result<()> {
    insert_area(db, 1, "Nevada", None, None, None).await?;
    insert_area(db, 2, "Red Rock", Some(1), Some((36.13, -115.43)), None).await?;
    insert_route(db, 100, 2, "Crimson Chrysalis", Some("Trad"), Some((36.135, -115.430))).await?;
    insert_route(db, 101, 2, "The Fox", Some("Trad"), None).await?;
    insert_route(db, 102, 2, "Go", Some("Sport"), None).await?;

    let kaya = KayaRepository::new(db);
    kaya.upsert_climb(
        &climb_at("crimson-chrysalis", "Crimson Chrysalis", Some("Red Rock Canyon"), Some((36.135, -115.430))),
        None,
    )
    .await?;
    kaya.upsert_climb(&climb_at("crimsen-chrysalis", "Crimsen Chrysalis", None, None), None)
        .await?;
    kaya.upsert_climb(&climb_at("fox", "Fox", Some("Red Rock"), None), None)
        .await?;
    kaya.upsert_climb(&climb_at("unrelated", "Moonlight Buttress", Some("Zion"), None), None)
        .await?;
    Ok(())
}

#[tokio::test]
async fn match_area_scores_and_stores_qualifying_pairs() -> Result<()> {
    let db = setup_test_db().await?;
    seed_red_rock(&db).await?;

    let summary = EntityMatcher::new(db.clone()).match_area(2, 0.6).await?;
    assert_eq!(summary.routes, 3);
    assert_eq!(summary.saved, 3);

    let matches = MatchRepository::new(&db);
    let crimson = matches.matches_for_route(100).await?;
    assert_eq!(crimson.len(), 2);

    let exact = &crimson[0];
    assert_eq!(exact.kaya_climb_slug, "crimson-chrysalis");
    assert_eq!(exact.match_type, MatchType::ExactName);
    assert!(exact.location_match);
    assert!(exact.confidence >= 0.95);
    assert!(exact.distance_km.is_some_and(|d| d < 0.01));

    let fuzzy = &crimson[1];
    assert_eq!(fuzzy.kaya_climb_slug, "crimsen-chrysalis");
    assert_eq!(fuzzy.match_type, MatchType::FuzzyName);
    assert!(!fuzzy.location_match);
    assert!(fuzzy.confidence <= 0.7 * fuzzy.name_similarity + 1e-9);

    // Article stripped on both sides; the area label matches.
    let fox = matches.matches_for_route(101).await?;
    assert_eq!(fox.len(), 1);
    assert_eq!(fox[0].match_type, MatchType::ExactName);

    // Nothing in the catalogue contains "go".
    assert!(matches.matches_for_route(102).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn candidates_are_found_through_punctuation_and_case() -> Result<()> {
    let db = setup_test_db().await?;
    insert_area(&db, 3, "Crags", None, None, None).await?;
    insert_route(&db, 300, 3, "Crack-a-Jack", Some("Trad"), None).await?;
    insert_route(&db, 301, 3, "Go", Some("Sport"), None).await?;
    insert_route(&db, 302, 3, "Élan", Some("Sport"), None).await?;

    let kaya = KayaRepository::new(&db);
    kaya.upsert_climb(&climb("crack-a-jack", "Crack-a-Jack"), None).await?;
    kaya.upsert_climb(&climb("go", "Go!"), None).await?;
    kaya.upsert_climb(&climb("elan", "ÉLAN"), None).await?;

    let summary = EntityMatcher::new(db.clone()).match_area(3, 0.5).await?;
    assert_eq!(summary.saved, 3);

    let matches = MatchRepository::new(&db);
    for (route_id, slug) in [(300, "crack-a-jack"), (301, "go"), (302, "elan")] {
        let found = matches.matches_for_route(route_id).await?;
        assert_eq!(found.len(), 1, "route {route_id}");
        assert_eq!(found[0].kaya_climb_slug, slug);
        assert_eq!(found[0].match_type, MatchType::ExactName);
    }
    Ok(())
}

#[tokio::test]
async fn rematching_updates_instead_of_duplicating() -> Result<()> {
    let db = setup_test_db().await?;
    seed_red_rock(&db).await?;
    let matcher = EntityMatcher::new(db.clone());
    let matches = MatchRepository::new(&db);

    matcher.match_area(2, 0.6).await?;
    let first = matches.count().await?;
    matcher.match_area(2, 0.6).await?;
    assert_eq!(matches.count().await?, first);
    Ok(())
}

#[tokio::test]
async fn threshold_filters_weak_pairs() -> Result<()> {
    let db = setup_test_db().await?;
    seed_red_rock(&db).await?;

    let summary = EntityMatcher::new(db.clone()).match_area(2, 0.8).await?;
    assert_eq!(summary.saved, 2);
    assert_eq!(MatchRepository::new(&db).matches_for_route(100).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_area_is_not_found() -> Result<()> {
    let db = setup_test_db().await?;
    let err = EntityMatcher::new(db)
        .match_area(404, 0.6)
        .await
        .expect_err("missing area");
    assert!(err.is_not_found());
    Ok(())
}

#[tokio::test]
async fn match_all_resumes_after_checkpoint() -> Result<()> {
    let db = setup_test_db().await?;
    seed_red_rock(&db).await?;
    let tracker = JobTracker::new(db.clone());

    // A previous run got through area 1 and was paused.
    let job = tracker
        .start_job(MATCH_ALL_JOB_NAME, "area_match", None, None)
        .await?;
    tracker
        .save_checkpoint(
            job.id,
            &AreaMatchCheckpoint {
                last_area_id: Some(1),
                matches_saved: 0,
            },
        )
        .await?;
    tracker.mark_job_paused(job.id).await?;

    let summary = EntityMatcher::new(db.clone())
        .with_tracker(tracker.clone())
        .match_all_areas(0.6)
        .await?;

    assert!(summary.resumed);
    assert_eq!(summary.job_id, job.id);
    assert_eq!(summary.areas, 1);
    assert_eq!(summary.matches_saved, 3);

    let stored = tracker.get_job(job.id).await?.expect("job exists");
    assert_eq!(stored.status, JobStatus::Completed);
    let checkpoint = tracker.load_checkpoint::<AreaMatchCheckpoint>(job.id).await;
    // Completed jobs still carry their last checkpoint.
    assert_eq!(
        checkpoint?,
        Some(AreaMatchCheckpoint {
            last_area_id: Some(2),
            matches_saved: 3
        })
    );

    // Nothing interrupted now: a fresh run covers every area.
    let fresh = EntityMatcher::new(db.clone())
        .with_tracker(tracker)
        .match_all_areas(0.6)
        .await?;
    assert!(!fresh.resumed);
    assert_eq!(fresh.areas, 2);
    Ok(())
}
