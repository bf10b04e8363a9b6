use thiserror::Error;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("bank upload batch {0} not found")]
    NotFound(uuid::Uuid),
}
