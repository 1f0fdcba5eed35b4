pub mod sqlite;
pub mod progression;
pub mod admin;
pub mod stats;

pub use sqlite::SqliteBondStore;
pub use progression::{AffectionUpdateService, UpdateResult, DEFAULT_HISTORY_LIMIT};
pub use admin::{AdminAction, AdminOutcome, AdminParams, AdministrativeOverride, IMPACT_SCALE};
pub use stats::{RelationshipStats, StatsQuery};
