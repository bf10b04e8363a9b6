//! Durable job queue and worker loop (spec.md §4.I).

pub mod backoff;
pub mod error;
pub mod job;
pub mod pg;
pub mod repository;
pub mod worker;

pub use backoff::{backoff_delay, next_run_at, should_retry};
pub use error::QueueError;
pub use job::{Job, JobName, JobStatus};
pub use pg::PgQueueRepository;
pub use repository::QueueRepository;
pub use worker::{box_handler, run, Handler, WorkerConfig};
