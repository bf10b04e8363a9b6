use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("goal {0} could not be matched: {1}")]
    Goal(String, String),
}
