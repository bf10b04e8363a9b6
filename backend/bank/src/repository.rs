//! Persistence seam for the bank pipeline (spec.md §4.K): the batch
//! envelope, the linked goal-transaction rows, and the master-table
//! lookups [`crate::linker::link_row`] needs to decide match status.

use std::collections::HashMap;

use model::{BankGoalTransaction, BankUploadBatch, Goal, ProcessingStatus, RowError, ValidationStatus};
use uuid::Uuid;

use crate::error::BankError;

#[async_trait::async_trait]
pub trait BankRepository: Send + Sync {
    async fn get(&self, batch_id: Uuid) -> Result<BankUploadBatch, BankError>;
    async fn insert_upload_batch(&self, batch: &BankUploadBatch) -> Result<(), BankError>;
    async fn set_status(&self, batch_id: Uuid, status: ProcessingStatus) -> Result<(), BankError>;
    #[allow(clippy::too_many_arguments)]
    async fn record_validation_result(
        &self,
        batch_id: Uuid,
        total_records: u64,
        processed_records: u64,
        failed_records: u64,
        errors: &[RowError],
        warnings: &[RowError],
        status: ValidationStatus,
    ) -> Result<(), BankError>;
    async fn insert_goal_transactions(&self, rows: &[BankGoalTransaction]) -> Result<(), BankError>;
    async fn account_ids_by_number(&self) -> Result<HashMap<String, Uuid>, BankError>;
    async fn goals_by_key(&self) -> Result<HashMap<String, Goal>, BankError>;
}
