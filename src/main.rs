//! # climb-sync command line
//!
//! Entry point for running the ingestion pipeline's batch operations.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Parser, Subcommand};
use climb_sync::{
    config::{AppConfig, ConfigLoader},
    db,
    job_tracker::JobTracker,
    kaya::KayaHttpClient,
    matcher::EntityMatcher,
    models::route_priority::PriorityTier,
    orchestrator::{SyncOptions, SyncOrchestrator, SyncSettings},
    scheduler::PriorityScheduler,
    telemetry,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "climb-sync", version, about = "Kaya / MP ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations
    Migrate,
    /// Sync one Kaya location and its sub-locations
    SyncLocation {
        slug: String,
        #[arg(long)]
        no_recursive: bool,
        /// Sub-location levels to descend
        #[arg(long)]
        depth: Option<u32>,
    },
    /// Recompute route priorities once
    RecomputePriorities,
    /// List routes of a tier that are due for re-sync
    DueRoutes {
        tier: PriorityTier,
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Match Kaya climbs against the routes of one area
    MatchArea {
        area_id: i64,
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// Match every area, resuming an interrupted run
    MatchAll {
        #[arg(long)]
        min_confidence: Option<f64>,
    },
    /// List running or paused jobs
    RecoverJobs {
        #[arg(long)]
        max_age_hours: Option<i64>,
    },
    /// Run the priority recomputation loop until interrupted
    RunScheduler,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::new().load().context("loading configuration")?;
    telemetry::init_tracing(&config).context("initializing tracing")?;
    if let Ok(redacted) = config.redacted_json() {
        info!(config = %redacted, profile = %config.profile, "Configuration loaded");
    }

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    db::health_check(&db).await.context("checking database")?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, shutting down");
            signal_token.cancel();
        }
    });

    let tracker = JobTracker::new(db.clone()).with_recovery_window(config.job.recovery_window());

    match cli.command {
        Command::Migrate => {
            db::run_migrations(&db).await.context("running migrations")?;
            println!("migrations applied");
        }
        Command::SyncLocation {
            slug,
            no_recursive,
            depth,
        } => {
            let client = KayaHttpClient::from_config(&config).context("building Kaya client")?;
            let orchestrator = SyncOrchestrator::new(db.clone(), Arc::new(client))
                .with_settings(SyncSettings::from(&config))
                .with_tracker(tracker)
                .with_cancellation(shutdown.clone());
            let options = SyncOptions::recursive(!no_recursive)
                .with_max_depth(depth.unwrap_or(config.sync.max_depth));
            let report = orchestrator
                .sync_location(&slug, options)
                .await
                .with_context(|| format!("syncing location {slug}"))?;
            println!(
                "synced {} location(s): {} climbs, {} ascents, {} sub-locations (job {})",
                report.locations, report.climbs, report.ascents, report.sub_locations, report.job_id
            );
        }
        Command::RecomputePriorities => {
            let summary = scheduler(&config, &db, tracker)
                .recompute()
                .await
                .context("recomputing priorities")?;
            println!(
                "{} routes: {} high, {} medium, {} low",
                summary.routes, summary.high, summary.medium, summary.low
            );
        }
        Command::DueRoutes { tier, limit } => {
            let routes = scheduler(&config, &db, tracker)
                .due_routes(tier, limit)
                .await
                .context("querying due routes")?;
            for route in routes {
                let last = route
                    .last_synced_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!("{}\t{}\t{}", route.route_id, route.priority_tier, last);
            }
        }
        Command::MatchArea {
            area_id,
            min_confidence,
        } => {
            let summary = EntityMatcher::new(db.clone())
                .with_tracker(tracker)
                .match_area(area_id, min_confidence.unwrap_or(config.matcher.min_confidence))
                .await
                .with_context(|| format!("matching area {area_id}"))?;
            println!(
                "area {}: {} routes, {} candidates, {} matches saved",
                summary.area_id, summary.routes, summary.candidates, summary.saved
            );
        }
        Command::MatchAll { min_confidence } => {
            let summary = EntityMatcher::new(db.clone())
                .with_tracker(tracker)
                .with_cancellation(shutdown.clone())
                .with_progress_batch_size(config.progress.batch_size)
                .match_all_areas(min_confidence.unwrap_or(config.matcher.min_confidence))
                .await
                .context("matching all areas")?;
            println!(
                "{} areas matched ({} failed), {} matches saved{}",
                summary.areas,
                summary.failed_areas,
                summary.matches_saved,
                if summary.resumed { " (resumed)" } else { "" }
            );
        }
        Command::RecoverJobs { max_age_hours } => {
            let max_age = max_age_hours
                .map(Duration::hours)
                .unwrap_or_else(|| config.job.recovery_window());
            let jobs = tracker
                .recover_interrupted_jobs(max_age)
                .await
                .context("listing interrupted jobs")?;
            for job in jobs {
                println!(
                    "{}\t{}\t{:?}\t{}/{}\t{}",
                    job.id,
                    job.job_name,
                    job.status,
                    job.processed_items,
                    job.total_items.map_or_else(|| "?".to_string(), |t| t.to_string()),
                    job.started_at.to_rfc3339()
                );
            }
        }
        Command::RunScheduler => {
            scheduler(&config, &db, tracker).run(shutdown).await;
        }
    }

    Ok(())
}

fn scheduler(
    config: &AppConfig,
    db: &sea_orm::DatabaseConnection,
    tracker: JobTracker,
) -> PriorityScheduler {
    PriorityScheduler::new(db.clone(), config.priority.clone()).with_tracker(tracker)
}
