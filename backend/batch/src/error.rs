use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("entity error: {0}")]
    Entity(#[from] entities::EntityError),
    #[error("batch {batch_id} is in state {current:?}, cannot transition to {attempted:?}")]
    InvalidTransition {
        batch_id: uuid::Uuid,
        current: model::ProcessingStatus,
        attempted: model::ProcessingStatus,
    },
    #[error("rollback of batch {0} exceeded its timeout")]
    RollbackTimedOut(uuid::Uuid),
    #[error("batch {0} not found")]
    NotFound(uuid::Uuid),
}
