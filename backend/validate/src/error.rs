//! Infra-level errors the validation pipeline itself can raise, distinct
//! from the per-row [`model::RowError`]s it produces as data.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("goal transaction code could not be derived for row {row_number}: {source}")]
    CodeGeneration {
        row_number: u64,
        #[source]
        source: model::CodeError,
    },
}
