mod test_utils;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use climb_sync::kaya::{Ascent, Climb, ClientError, ClimbCategory, KayaClient, Location};
use climb_sync::models::job_execution::JobStatus;
use climb_sync::models::kaya_sync_progress::SyncStatus;
use climb_sync::models::{JobExecution, KayaAscent, KayaClimb, KayaLocation, KayaUser};
use climb_sync::orchestrator::{SyncError, SyncOptions, SyncOrchestrator, sync_job_name};
use climb_sync::repositories::KayaRepository;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use test_utils::{ascent, climb, location, setup_test_db};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Location(String),
    SubLocations { location_id: String, offset: u32 },
    Climbs { location_id: String, category: Option<ClimbCategory>, offset: u32 },
    Ascents { location_id: String, offset: u32, count: u32 },
}

/// In-memory Kaya keyed by location id.
#[derive(Default)]
struct FakeKaya {
    locations: HashMap<String, Location>,
    children: HashMap<String, Vec<Location>>,
    climbs: HashMap<String, Vec<Climb>>,
    ascents: HashMap<String, Vec<Ascent>>,
    fail_location: bool,
    fail_ascents: bool,
    /// Cancelled after the first climb page is served.
    cancel_after_climbs: Option<CancellationToken>,
    calls: Mutex<Vec<Call>>,
}

impl FakeKaya {
    fn with_location(mut self, loc: Location) -> Self {
        self.locations.insert(loc.slug.clone(), loc);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn page<T: Clone>(items: Option<&Vec<T>>, offset: u32, count: u32) -> Vec<T> {
        items
            .map(|all| {
                all.iter()
                    .skip(offset as usize)
                    .take(count as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl KayaClient for FakeKaya {
    async fn get_location(&self, slug: &str) -> Result<Option<Location>, ClientError> {
        self.calls.lock().unwrap().push(Call::Location(slug.to_string()));
        if self.fail_location {
            return Err(ClientError::Http {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(self.locations.get(slug).cloned())
    }

    async fn get_sub_locations(
        &self,
        location_id: &str,
        _type_filter: Option<&str>,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Location>, ClientError> {
        self.calls.lock().unwrap().push(Call::SubLocations {
            location_id: location_id.to_string(),
            offset,
        });
        Ok(Self::page(self.children.get(location_id), offset, count))
    }

    async fn get_climbs(
        &self,
        location_id: &str,
        type_filter: Option<ClimbCategory>,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Climb>, ClientError> {
        self.calls.lock().unwrap().push(Call::Climbs {
            location_id: location_id.to_string(),
            category: type_filter,
            offset,
        });
        if let Some(token) = &self.cancel_after_climbs {
            token.cancel();
        }
        Ok(Self::page(self.climbs.get(location_id), offset, count))
    }

    async fn get_ascents(
        &self,
        location_id: &str,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Ascent>, ClientError> {
        self.calls.lock().unwrap().push(Call::Ascents {
            location_id: location_id.to_string(),
            offset,
            count,
        });
        if self.fail_ascents {
            return Err(ClientError::RateLimited {
                retry_after: Some(60),
            });
        }
        Ok(Self::page(self.ascents.get(location_id), offset, count))
    }
}

fn climbs(prefix: &str, n: usize) -> Vec<Climb> {
    (0..n)
        .map(|i| climb(&format!("{prefix}-{i}"), &format!("Problem {i}")))
        .collect()
}

fn root_with_25_climbs() -> FakeKaya {
    let mut fake = FakeKaya::default().with_location(location("loc-1", "joes-valley"));
    fake.climbs.insert("loc-1".into(), climbs("joes", 25));
    fake
}

async fn count_rows(db: &DatabaseConnection) -> Result<(u64, u64, u64, u64)> {
    Ok((
        KayaLocation::find().count(db).await?,
        KayaClimb::find().count(db).await?,
        KayaAscent::find().count(db).await?,
        KayaUser::find().count(db).await?,
    ))
}

#[tokio::test]
async fn paginates_climbs_until_short_page() -> Result<()> {
    let db = setup_test_db().await?;
    let fake = Arc::new(root_with_25_climbs());
    let orchestrator = SyncOrchestrator::new(db.clone(), fake.clone());

    let report = orchestrator.sync_location_by_slug("joes-valley", true).await?;

    let climb_calls: Vec<_> = fake
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Climbs { category, offset, .. } => Some((category, offset)),
            _ => None,
        })
        .collect();
    assert_eq!(
        climb_calls,
        vec![
            (Some(ClimbCategory::Boulder), 0),
            (Some(ClimbCategory::Boulder), 20),
            (Some(ClimbCategory::Route), 0),
            (Some(ClimbCategory::Route), 20),
        ]
    );
    assert_eq!(KayaClimb::find().count(&db).await?, 25);
    assert_eq!(report.locations, 1);
    Ok(())
}

#[tokio::test]
async fn no_sub_locations_means_single_request_and_no_recursion() -> Result<()> {
    let db = setup_test_db().await?;
    let fake = Arc::new(root_with_25_climbs());
    let orchestrator = SyncOrchestrator::new(db.clone(), fake.clone());

    let report = orchestrator.sync_location_by_slug("joes-valley", true).await?;

    let sub_calls: Vec<_> = fake
        .calls()
        .into_iter()
        .filter(|c| matches!(c, Call::SubLocations { .. }))
        .collect();
    assert_eq!(
        sub_calls,
        vec![Call::SubLocations {
            location_id: "loc-1".into(),
            offset: 0
        }]
    );
    assert_eq!(report.sub_locations, 0);
    Ok(())
}

#[tokio::test]
async fn non_recursive_sync_skips_sub_locations() -> Result<()> {
    let db = setup_test_db().await?;
    let fake = Arc::new(root_with_25_climbs());
    let orchestrator = SyncOrchestrator::new(db.clone(), fake.clone());

    orchestrator.sync_location_by_slug("joes-valley", false).await?;

    assert!(!fake.calls().iter().any(|c| matches!(c, Call::SubLocations { .. })));
    Ok(())
}

#[tokio::test]
async fn syncing_twice_is_idempotent() -> Result<()> {
    let db = setup_test_db().await?;
    let mut fake = root_with_25_climbs();
    fake.ascents.insert(
        "loc-1".into(),
        (0..7)
            .map(|i| ascent(&format!("a-{i}"), &format!("joes-{i}"), &format!("u-{}", i % 3)))
            .collect(),
    );
    let orchestrator = SyncOrchestrator::new(db.clone(), Arc::new(fake));

    orchestrator.sync_location_by_slug("joes-valley", true).await?;
    let first = count_rows(&db).await?;
    orchestrator.sync_location_by_slug("joes-valley", true).await?;
    let second = count_rows(&db).await?;

    assert_eq!(first, (1, 25, 7, 3));
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn recursion_respects_depth_and_finalizes_children() -> Result<()> {
    let db = setup_test_db().await?;
    let mut fake = FakeKaya::default().with_location(location("root", "bishop"));
    fake.children.insert(
        "root".into(),
        vec![location("child-a", "buttermilks"), location("child-b", "happies")],
    );
    fake.children
        .insert("child-a".into(), vec![location("grandchild", "peabody")]);
    fake.climbs.insert("child-a".into(), climbs("bm", 3));
    fake.climbs.insert("child-b".into(), climbs("hp", 2));
    let fake = Arc::new(fake);
    let orchestrator = SyncOrchestrator::new(db.clone(), fake.clone());

    let report = orchestrator
        .sync_location("bishop", SyncOptions::recursive(true).with_max_depth(1))
        .await?;

    assert_eq!(report.locations, 3);
    assert_eq!(report.sub_locations, 2);
    assert_eq!(report.climbs, 5);
    assert!(
        !fake
            .calls()
            .contains(&Call::SubLocations { location_id: "child-a".into(), offset: 0 }),
        "depth 1 must not list grandchildren"
    );

    let repo = KayaRepository::new(&db);
    for id in ["root", "child-a", "child-b"] {
        let progress = repo.get_sync_progress(id).await?.expect("progress row");
        assert_eq!(progress.status, SyncStatus::Completed, "{id}");
        assert!(progress.next_sync_at.is_some());
    }
    let child = repo.get_sync_progress("child-a").await?.expect("progress row");
    assert_eq!(child.climbs_synced, 3);
    assert!(repo.get_sync_progress("grandchild").await?.is_none());

    let deeper = orchestrator
        .sync_location("bishop", SyncOptions::recursive(true).with_max_depth(2))
        .await?;
    assert_eq!(deeper.locations, 4);
    Ok(())
}

#[tokio::test]
async fn ascents_are_capped_per_location() -> Result<()> {
    let db = setup_test_db().await?;
    let mut fake = FakeKaya::default().with_location(location("loc-1", "rocklands"));
    fake.ascents.insert(
        "loc-1".into(),
        (0..50)
            .map(|i| ascent(&format!("a-{i}"), "some-climb", "u-1"))
            .collect(),
    );
    let fake = Arc::new(fake);
    let settings = climb_sync::orchestrator::SyncSettings {
        max_ascents_per_location: 30,
        ..Default::default()
    };
    let orchestrator = SyncOrchestrator::new(db.clone(), fake.clone()).with_settings(settings);

    let report = orchestrator.sync_location_by_slug("rocklands", false).await?;

    assert_eq!(report.ascents, 30);
    let ascent_calls: Vec<_> = fake
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Ascents { offset, count, .. } => Some((offset, count)),
            _ => None,
        })
        .collect();
    assert_eq!(ascent_calls, vec![(0, 20), (20, 10)]);
    Ok(())
}

#[tokio::test]
async fn unstorable_items_are_skipped_and_counted() -> Result<()> {
    let db = setup_test_db().await?;
    let mut fake = FakeKaya::default().with_location(location("loc-1", "hueco"));
    fake.climbs.insert(
        "loc-1".into(),
        vec![climb("ok-0", "Problem 0"), climb("", "Nameless"), climb("ok-1", "Problem 1")],
    );
    let mut orphan = ascent("a-orphan", "unused", "u-2");
    orphan.climb_slug = None;
    orphan.climb = None;
    fake.ascents
        .insert("loc-1".into(), vec![ascent("a-0", "ok-0", "u-1"), orphan]);
    let orchestrator = SyncOrchestrator::new(db.clone(), Arc::new(fake));

    let report = orchestrator.sync_location_by_slug("hueco", false).await?;

    // Both categories serve the same three climbs.
    assert_eq!(report.climbs, 4);
    assert_eq!(report.ascents, 1);
    assert_eq!(KayaClimb::find().count(&db).await?, 2);
    assert_eq!(KayaAscent::find().count(&db).await?, 1);

    let progress = KayaRepository::new(&db)
        .get_sync_progress("loc-1")
        .await?
        .expect("progress row");
    assert_eq!(progress.status, SyncStatus::Completed);
    assert!(progress.last_error.is_none());
    assert_eq!(progress.climbs_synced, 4);
    assert_eq!(progress.ascents_synced, 1);

    let job = JobExecution::find_by_id(report.job_id)
        .one(&db)
        .await?
        .expect("job row");
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.succeeded_items, 5);
    assert_eq!(job.failed_items, 3);
    Ok(())
}

#[tokio::test]
async fn phase_failure_is_retained_while_other_phases_run() -> Result<()> {
    let db = setup_test_db().await?;
    let mut fake = root_with_25_climbs();
    fake.fail_ascents = true;
    let fake = Arc::new(fake);
    let orchestrator = SyncOrchestrator::new(db.clone(), fake.clone());

    let err = orchestrator
        .sync_location_by_slug("joes-valley", true)
        .await
        .expect_err("ascent failure surfaces");
    assert!(matches!(err, SyncError::Fetch { phase: "ascents", .. }));

    // Climbs and sub-locations still ran.
    assert_eq!(KayaClimb::find().count(&db).await?, 25);
    assert!(fake.calls().iter().any(|c| matches!(c, Call::SubLocations { .. })));

    let progress = KayaRepository::new(&db)
        .get_sync_progress("loc-1")
        .await?
        .expect("progress row");
    assert_eq!(progress.status, SyncStatus::Failed);
    assert!(progress.last_error.is_some());
    assert_eq!(progress.climbs_synced, 25);

    let job = JobExecution::find()
        .filter(climb_sync::models::job_execution::Column::JobName.eq(sync_job_name("joes-valley")))
        .one(&db)
        .await?
        .expect("job row");
    assert_eq!(job.status, JobStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn location_fetch_failure_is_fatal() -> Result<()> {
    let db = setup_test_db().await?;
    let mut fake = root_with_25_climbs();
    fake.fail_location = true;
    let fake = Arc::new(fake);
    let orchestrator = SyncOrchestrator::new(db.clone(), fake.clone());

    let err = orchestrator
        .sync_location_by_slug("joes-valley", true)
        .await
        .expect_err("fetch failure is fatal");
    assert!(matches!(err, SyncError::LocationFetch { .. }));
    assert_eq!(fake.calls().len(), 1);
    assert_eq!(count_rows(&db).await?, (0, 0, 0, 0));

    let missing = orchestrator
        .sync_location_by_slug("nowhere", true)
        .await
        .expect_err("location fetch still failing");
    assert!(matches!(missing, SyncError::LocationFetch { .. }));

    let jobs = JobExecution::find().all(&db).await?;
    assert!(jobs.iter().all(|j| j.status == JobStatus::Failed));
    Ok(())
}

#[tokio::test]
async fn unknown_location_is_not_found() -> Result<()> {
    let db = setup_test_db().await?;
    let orchestrator = SyncOrchestrator::new(db.clone(), Arc::new(FakeKaya::default()));

    let err = orchestrator
        .sync_location_by_slug("nowhere", true)
        .await
        .expect_err("missing location");
    assert!(matches!(err, SyncError::LocationNotFound(slug) if slug == "nowhere"));
    Ok(())
}

#[tokio::test]
async fn concurrent_sync_fails_fast() -> Result<()> {
    let db = setup_test_db().await?;
    let orchestrator = SyncOrchestrator::new(db.clone(), Arc::new(root_with_25_climbs()));

    let _held = orchestrator.lock().try_acquire().expect("lock free");
    let err = orchestrator
        .sync_location_by_slug("joes-valley", true)
        .await
        .expect_err("lock held");
    assert!(matches!(err, SyncError::AlreadyRunning));
    assert_eq!(JobExecution::find().count(&db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn cancellation_pauses_job_and_fails_progress() -> Result<()> {
    let db = setup_test_db().await?;
    let token = CancellationToken::new();
    let mut fake = root_with_25_climbs();
    fake.cancel_after_climbs = Some(token.clone());
    let fake = Arc::new(fake);
    let orchestrator = SyncOrchestrator::new(db.clone(), fake.clone()).with_cancellation(token);

    let err = orchestrator
        .sync_location_by_slug("joes-valley", true)
        .await
        .expect_err("cancelled");
    assert!(matches!(err, SyncError::Cancelled));

    // The page in flight completes; nothing after it is requested.
    let calls = fake.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(KayaClimb::find().count(&db).await?, 20);

    let progress = KayaRepository::new(&db)
        .get_sync_progress("loc-1")
        .await?
        .expect("progress row");
    assert_eq!(progress.status, SyncStatus::Failed);
    assert_eq!(progress.last_error.as_deref(), Some("sync cancelled"));

    let job = JobExecution::find().one(&db).await?.expect("job row");
    assert_eq!(job.status, JobStatus::Paused);
    Ok(())
}
