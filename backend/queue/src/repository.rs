use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobName};

#[async_trait::async_trait]
pub trait QueueRepository: Send + Sync {
    async fn enqueue(&self, name: JobName, payload: serde_json::Value, run_at: DateTime<Utc>, max_attempts: u32) -> Result<Uuid, QueueError>;

    /// Locks and returns the next eligible job (`run_at <= now`, unlocked
    /// or with an expired lock) via `SELECT ... FOR UPDATE SKIP LOCKED`, so
    /// concurrent workers never contend on the same row.
    async fn dequeue(&self, worker_id: &str, lock_seconds: i64) -> Result<Option<Job>, QueueError>;

    async fn renew_lock(&self, job_id: Uuid, worker_id: &str, lock_seconds: i64) -> Result<(), QueueError>;
    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError>;
    async fn fail_and_reschedule(&self, job_id: Uuid, error: &str, run_at: DateTime<Utc>) -> Result<(), QueueError>;
    async fn fail_terminal(&self, job_id: Uuid, error: &str) -> Result<(), QueueError>;

    async fn purge_completed(&self, keep_count: usize, keep_hours: i64) -> Result<u64, QueueError>;
    async fn purge_failed(&self, keep_count: usize, keep_days: i64) -> Result<u64, QueueError>;
}
