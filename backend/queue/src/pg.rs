//! Postgres-backed [`QueueRepository`] using `SELECT ... FOR UPDATE SKIP
//! LOCKED`, raw `sqlx::query`/`query_as` (no `query!` macro).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobName, JobStatus};
use crate::repository::QueueRepository;

pub struct PgQueueRepository {
    pool: PgPool,
}

impl PgQueueRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QueueRepository for PgQueueRepository {
    async fn enqueue(&self, name: JobName, payload: serde_json::Value, run_at: DateTime<Utc>, max_attempts: u32) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO jobs (id, name, payload, status, attempts, max_attempts, run_at, created_at) \
             VALUES ($1, $2, $3, 'pending', 0, $4, $5, NOW())",
        )
        .bind(id)
        .bind(name.as_str())
        .bind(payload)
        .bind(max_attempts as i32)
        .bind(run_at)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn dequeue(&self, worker_id: &str, lock_seconds: i64) -> Result<Option<Job>, QueueError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT id, name, payload, status, attempts, max_attempts, locked_by, locked_until, run_at, last_error, created_at, completed_at \
             FROM jobs \
             WHERE status IN ('pending', 'locked') \
               AND run_at <= NOW() \
               AND (locked_until IS NULL OR locked_until < NOW()) \
             ORDER BY run_at ASC \
             FOR UPDATE SKIP LOCKED \
             LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let id: Uuid = row.get("id");
        let locked_until = Utc::now() + chrono::Duration::seconds(lock_seconds);
        sqlx::query("UPDATE jobs SET status = 'locked', locked_by = $1, locked_until = $2 WHERE id = $3")
            .bind(worker_id)
            .bind(locked_until)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(row_to_job(&row, locked_until, worker_id)))
    }

    async fn renew_lock(&self, job_id: Uuid, worker_id: &str, lock_seconds: i64) -> Result<(), QueueError> {
        let locked_until = Utc::now() + chrono::Duration::seconds(lock_seconds);
        let result = sqlx::query(
            "UPDATE jobs SET locked_until = $1 WHERE id = $2 AND locked_by = $3 AND status = 'locked'",
        )
        .bind(locked_until)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(QueueError::JobNotLocked(job_id));
        }
        Ok(())
    }

    async fn complete(&self, job_id: Uuid) -> Result<(), QueueError> {
        sqlx::query("UPDATE jobs SET status = 'completed', completed_at = NOW() WHERE id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_and_reschedule(&self, job_id: Uuid, error: &str, run_at: DateTime<Utc>) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE jobs SET status = 'pending', attempts = attempts + 1, last_error = $1, \
             run_at = $2, locked_by = NULL, locked_until = NULL WHERE id = $3",
        )
        .bind(error)
        .bind(run_at)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_terminal(&self, job_id: Uuid, error: &str) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE jobs SET status = 'failed', attempts = attempts + 1, last_error = $1, completed_at = NOW() WHERE id = $2",
        )
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_completed(&self, keep_count: usize, keep_hours: i64) -> Result<u64, QueueError> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status = 'completed' AND completed_at < NOW() - ($1 || ' hours')::interval \
             AND id NOT IN (SELECT id FROM jobs WHERE status = 'completed' ORDER BY completed_at DESC LIMIT $2)",
        )
        .bind(keep_hours)
        .bind(keep_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_failed(&self, keep_count: usize, keep_days: i64) -> Result<u64, QueueError> {
        let result = sqlx::query(
            "DELETE FROM jobs WHERE status = 'failed' AND completed_at < NOW() - ($1 || ' days')::interval \
             AND id NOT IN (SELECT id FROM jobs WHERE status = 'failed' ORDER BY completed_at DESC LIMIT $2)",
        )
        .bind(keep_days)
        .bind(keep_count as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn row_to_job(row: &sqlx::postgres::PgRow, locked_until: DateTime<Utc>, worker_id: &str) -> Job {
    let name: String = row.get("name");
    let status: String = row.get("status");
    Job {
        id: row.get("id"),
        name: JobName::parse(&name).unwrap_or(JobName::ProcessNewUpload),
        payload: row.get("payload"),
        status: parse_status(&status),
        attempts: row.get::<i32, _>("attempts") as u32,
        max_attempts: row.get::<i32, _>("max_attempts") as u32,
        locked_by: Some(worker_id.to_string()),
        locked_until: Some(locked_until),
        run_at: row.get("run_at"),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        completed_at: row.get("completed_at"),
    }
}

fn parse_status(raw: &str) -> JobStatus {
    match raw {
        "pending" => JobStatus::Pending,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Locked,
    }
}
