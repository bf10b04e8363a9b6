//! Batch Writer and Batch Manager (spec.md §4.G, §4.H).

pub mod error;
pub mod manager;
pub mod pg;
pub mod state;
pub mod writer;

pub use error::BatchError;
pub use manager::{BatchManager, BatchRepository};
pub use pg::PgBatchRepository;
pub use state::{can_transition, is_rollback_eligible, is_terminal};
pub use writer::{chunk_for_write, resolve_transactions, write_all, BatchWriteRepository, EntityLookup};
