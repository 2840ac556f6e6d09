//! # Repository Layer
//!
//! Repositories wrap SeaORM access to the tables the pipeline owns and the canonical
//! tables it reads.

pub mod canonical;
pub mod kaya;
pub mod matches;
pub mod route_priority;

pub use canonical::CanonicalRepository;
pub use kaya::{KayaRepository, SyncCounts};
pub use matches::{MatchRepository, NewMatch};
pub use route_priority::{RouteMetrics, RoutePriorityRepository};
