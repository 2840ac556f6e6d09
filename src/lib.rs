//! # climb-sync
//!
//! Ingests climbing activity from the Kaya platform and reconciles it against the
//! canonical MP dataset: a recoverable job tracker, throttled progress reporting, an
//! adaptive route re-sync scheduler, a location sync orchestrator and an entity matcher.

pub mod checkpoint;
pub mod config;
pub mod db;
pub mod error;
pub mod job_tracker;
pub mod kaya;
pub mod matcher;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod repositories;
pub mod scheduler;
pub mod telemetry;
pub use migration;
