//! Database migrations for the climb-sync pipeline.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_11_10_000100_create_job_executions;
mod m2025_11_10_000200_create_canonical_tables;
mod m2025_11_10_000300_create_kaya_tables;
mod m2025_11_10_000400_create_route_priorities;
mod m2025_11_10_000500_create_kaya_mp_matches;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_10_000100_create_job_executions::Migration),
            Box::new(m2025_11_10_000200_create_canonical_tables::Migration),
            Box::new(m2025_11_10_000300_create_kaya_tables::Migration),
            Box::new(m2025_11_10_000400_create_route_priorities::Migration),
            Box::new(m2025_11_10_000500_create_kaya_mp_matches::Migration),
        ]
    }
}
