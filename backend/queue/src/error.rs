use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("job {0} not found or not locked by this worker")]
    JobNotLocked(uuid::Uuid),
    #[error("handler error: {0}")]
    Handler(#[source] anyhow::Error),
}
