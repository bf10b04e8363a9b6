use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("aggregate refresh exceeded its timeout")]
    TimedOut,
}
