//! # Data Models
//!
//! SeaORM entities for the tables owned by the pipeline and the canonical tables it reads.

pub mod climb_match;
pub mod job_execution;
pub mod kaya_ascent;
pub mod kaya_climb;
pub mod kaya_location;
pub mod kaya_sync_progress;
pub mod kaya_user;
pub mod mp_area;
pub mod mp_route;
pub mod mp_tick;
pub mod route_priority;

pub use climb_match::Entity as ClimbMatch;
pub use job_execution::Entity as JobExecution;
pub use kaya_ascent::Entity as KayaAscent;
pub use kaya_climb::Entity as KayaClimb;
pub use kaya_location::Entity as KayaLocation;
pub use kaya_sync_progress::Entity as KayaSyncProgress;
pub use kaya_user::Entity as KayaUser;
pub use mp_area::Entity as MpArea;
pub use mp_route::Entity as MpRoute;
pub use mp_tick::Entity as MpTick;
pub use route_priority::Entity as RoutePriority;
