//! New-entity detection and idempotent creation (spec.md §4.E, §4.F).

pub mod creator;
pub mod detector;
pub mod error;
pub mod pg;

pub use creator::{ensure_client_account_goal, EntityRepository};
pub use detector::{detect_new_entities, KnownEntities, NewEntitiesReport, NewEntitySummary, NewGoalSummary};
pub use error::EntityError;
pub use pg::PgEntityRepository;
