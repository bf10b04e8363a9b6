use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("goal {goal_number:?} references unknown account {account_number:?}")]
    OrphanGoal {
        account_number: String,
        goal_number: String,
    },
}
