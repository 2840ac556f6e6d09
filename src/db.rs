//! Database connection and pool management.
//!
//! Opens a SeaORM connection pool (Postgres in production, SQLite for local runs and
//! tests) with retry, and applies the bundled migrations.

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use migration::{Migrator, MigratorTrait};

const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {source}")]
    ConnectionFailed {
        #[from]
        source: DbErr,
    },
    #[error("Invalid database configuration: {message}")]
    InvalidConfiguration { message: String },
    #[error("Database migration failed: {0}")]
    Migration(DbErr),
    #[error("Database health check failed: {0}")]
    HealthCheck(DbErr),
}

/// Initializes a database connection pool with the given configuration.
///
/// Transient connection failures are retried with exponential backoff, starting at
/// 100ms and doubling, for up to five attempts.
///
/// # Examples
///
/// ```no_run
/// use climb_sync::{config::AppConfig, db::init_pool};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = AppConfig::default();
///     let db = init_pool(&config).await?;
///     // Use the database connection...
///     Ok(())
/// }
/// ```
pub async fn init_pool(cfg: &AppConfig) -> Result<DatabaseConnection, DatabaseError> {
    if cfg.database_url.is_empty() {
        return Err(DatabaseError::InvalidConfiguration {
            message: "Database URL cannot be empty".to_string(),
        });
    }

    let mut opt = ConnectOptions::new(&cfg.database_url);
    opt.max_connections(cfg.db_max_connections)
        .acquire_timeout(Duration::from_millis(cfg.db_acquire_timeout_ms))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let mut retry_delay = Duration::from_millis(100);
    let mut attempt = 1;

    loop {
        match Database::connect(opt.clone()).await {
            Ok(conn) => {
                info!(attempt, backend = ?conn.get_database_backend(), "Connected to database");
                return Ok(conn);
            }
            Err(e) if attempt >= MAX_CONNECT_ATTEMPTS => {
                error!(attempts = attempt, error = %e, "Giving up on database connection");
                return Err(DatabaseError::ConnectionFailed { source: e });
            }
            Err(e) => {
                warn!(attempt, error = %e, ?retry_delay, "Database connection failed, retrying");
                sleep(retry_delay).await;
                retry_delay *= 2;
                attempt += 1;
            }
        }
    }
}

/// Applies all pending migrations.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    Migrator::up(db, None)
        .await
        .map_err(DatabaseError::Migration)?;
    info!("Database migrations applied");
    Ok(())
}

/// Verifies that the connection is still usable by executing `SELECT 1`.
pub async fn health_check(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_string());
    db.query_one(stmt)
        .await
        .map_err(DatabaseError::HealthCheck)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_database_url() {
        let config = AppConfig {
            database_url: String::new(),
            ..AppConfig::default()
        };

        let result = init_pool(&config).await;
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidConfiguration { .. })
        ));
    }

    #[tokio::test]
    async fn sqlite_pool_migrates_and_passes_health_check() {
        let config = AppConfig {
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 1,
            ..AppConfig::default()
        };

        let db = init_pool(&config).await.expect("sqlite connects");
        run_migrations(&db).await.expect("migrations apply");
        health_check(&db).await.expect("health check passes");
    }
}
