//! Batch Manager (spec.md §4.H): owns `UploadBatch` state transitions and
//! rollback, including orphan cascade deletion of entities this batch
//! created.

use std::time::Duration;

use model::{ProcessingStatus, UploadBatch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::BatchError;
use crate::state::can_transition;

#[async_trait::async_trait]
pub trait BatchRepository: Send + Sync {
    async fn get(&self, batch_id: Uuid) -> Result<UploadBatch, BatchError>;
    async fn set_status(&self, batch_id: Uuid, status: ProcessingStatus) -> Result<(), BatchError>;
    /// Deletes this batch's `FundTransaction`s and any client/account/goal
    /// it created that has no remaining transactions from any other batch.
    async fn rollback_entities(&self, batch_id: Uuid) -> Result<(), BatchError>;
}

pub struct BatchManager<'a> {
    repo: &'a dyn BatchRepository,
    rollback_timeout: Duration,
}

impl<'a> BatchManager<'a> {
    pub fn new(repo: &'a dyn BatchRepository, rollback_timeout: Duration) -> Self {
        Self { repo, rollback_timeout }
    }

    pub async fn transition(&self, batch_id: Uuid, to: ProcessingStatus) -> Result<(), BatchError> {
        let batch = self.repo.get(batch_id).await?;
        if !can_transition(batch.processing_status, to) {
            warn!(%batch_id, from = ?batch.processing_status, to = ?to, "rejected invalid batch transition");
            return Err(BatchError::InvalidTransition {
                batch_id,
                current: batch.processing_status,
                attempted: to,
            });
        }
        self.repo.set_status(batch_id, to).await?;
        info!(%batch_id, from = ?batch.processing_status, to = ?to, "batch transitioned");
        Ok(())
    }

    /// Cancels a batch still in `QUEUED`/`PARSING`/`VALIDATING`/
    /// `WAITING_FOR_APPROVAL` — no rows have been written yet in those
    /// states so no entity rollback is needed.
    pub async fn cancel(&self, batch_id: Uuid) -> Result<(), BatchError> {
        self.transition(batch_id, ProcessingStatus::Canceled).await
    }

    /// Rolls back a batch that reached `PROCESSING` or `COMPLETED`:
    /// deletes its written transactions and cascades to orphaned entities,
    /// within `rollback_timeout` (spec.md §4.H's 2-minute default).
    pub async fn rollback(&self, batch_id: Uuid) -> Result<(), BatchError> {
        let batch = self.repo.get(batch_id).await?;
        if !crate::state::is_rollback_eligible(batch.processing_status) {
            return Err(BatchError::InvalidTransition {
                batch_id,
                current: batch.processing_status,
                attempted: ProcessingStatus::Failed,
            });
        }

        match tokio::time::timeout(self.rollback_timeout, self.repo.rollback_entities(batch_id)).await {
            Ok(result) => {
                result?;
                self.repo.set_status(batch_id, ProcessingStatus::Failed).await?;
                info!(%batch_id, "batch rolled back");
                Ok(())
            }
            Err(_) => {
                warn!(%batch_id, timeout = ?self.rollback_timeout, "batch rollback timed out");
                Err(BatchError::RollbackTimedOut(batch_id))
            }
        }
    }

    /// Resumes a batch sitting at `WAITING_FOR_APPROVAL` once an operator
    /// approves or rejects the new-entities report. Rejection transitions
    /// to `FAILED`, not `CANCELED` (spec.md §4.H) — `CANCELED` is reserved
    /// for an operator explicitly canceling a batch that hasn't written
    /// anything yet, via [`Self::cancel`].
    pub async fn resume_after_approval(&self, batch_id: Uuid, approved: bool) -> Result<(), BatchError> {
        if approved {
            self.transition(batch_id, ProcessingStatus::Processing).await
        } else {
            self.transition(batch_id, ProcessingStatus::Failed).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeRepo {
        batch: Mutex<UploadBatch>,
        rollback_delay: Duration,
    }

    fn sample_batch(status: ProcessingStatus) -> UploadBatch {
        UploadBatch {
            id: Uuid::new_v4(),
            batch_number: "B1".to_string(),
            file_name: "f.csv".to_string(),
            file_size: 0,
            file_path: "/tmp/f.csv".to_string(),
            processing_status: status,
            validation_status: model::ValidationStatus::Passed,
            total_records: 0,
            processed_records: 0,
            failed_records: 0,
            validation_errors: vec![],
            validation_warnings: vec![],
            new_entities_report: None,
            new_entities_status: model::NewEntitiesStatus::None,
            total_amount: model::Money::zero(),
            created_at: chrono::Utc::now(),
            processing_started_at: None,
            processing_completed_at: None,
            uploaded_by: "operator".to_string(),
            approved_by: None,
        }
    }

    #[async_trait::async_trait]
    impl BatchRepository for FakeRepo {
        async fn get(&self, _batch_id: Uuid) -> Result<UploadBatch, BatchError> {
            Ok(self.batch.lock().unwrap().clone())
        }
        async fn set_status(&self, _batch_id: Uuid, status: ProcessingStatus) -> Result<(), BatchError> {
            self.batch.lock().unwrap().processing_status = status;
            Ok(())
        }
        async fn rollback_entities(&self, _batch_id: Uuid) -> Result<(), BatchError> {
            tokio::time::sleep(self.rollback_delay).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn valid_transition_updates_status() {
        let repo = FakeRepo { batch: Mutex::new(sample_batch(ProcessingStatus::Queued)), rollback_delay: Duration::ZERO };
        let manager = BatchManager::new(&repo, Duration::from_secs(120));
        let id = repo.batch.lock().unwrap().id;
        manager.transition(id, ProcessingStatus::Parsing).await.unwrap();
        assert_eq!(repo.batch.lock().unwrap().processing_status, ProcessingStatus::Parsing);
    }

    #[tokio::test]
    async fn invalid_transition_is_rejected() {
        let repo = FakeRepo { batch: Mutex::new(sample_batch(ProcessingStatus::Queued)), rollback_delay: Duration::ZERO };
        let manager = BatchManager::new(&repo, Duration::from_secs(120));
        let id = repo.batch.lock().unwrap().id;
        let result = manager.transition(id, ProcessingStatus::Completed).await;
        assert!(matches!(result, Err(BatchError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn rollback_from_processing_marks_failed() {
        let repo = FakeRepo { batch: Mutex::new(sample_batch(ProcessingStatus::Processing)), rollback_delay: Duration::ZERO };
        let manager = BatchManager::new(&repo, Duration::from_secs(120));
        let id = repo.batch.lock().unwrap().id;
        manager.rollback(id).await.unwrap();
        assert_eq!(repo.batch.lock().unwrap().processing_status, ProcessingStatus::Failed);
    }

    #[tokio::test]
    async fn rollback_that_exceeds_timeout_errors() {
        let repo = FakeRepo { batch: Mutex::new(sample_batch(ProcessingStatus::Processing)), rollback_delay: Duration::from_millis(50) };
        let manager = BatchManager::new(&repo, Duration::from_millis(5));
        let id = repo.batch.lock().unwrap().id;
        let result = manager.rollback(id).await;
        assert!(matches!(result, Err(BatchError::RollbackTimedOut(_))));
    }

    #[tokio::test]
    async fn rollback_of_canceled_batch_is_rejected() {
        let repo = FakeRepo { batch: Mutex::new(sample_batch(ProcessingStatus::Canceled)), rollback_delay: Duration::ZERO };
        let manager = BatchManager::new(&repo, Duration::from_secs(120));
        let id = repo.batch.lock().unwrap().id;
        let result = manager.rollback(id).await;
        assert!(matches!(result, Err(BatchError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn approval_resumes_into_processing() {
        let repo = FakeRepo { batch: Mutex::new(sample_batch(ProcessingStatus::WaitingForApproval)), rollback_delay: Duration::ZERO };
        let manager = BatchManager::new(&repo, Duration::from_secs(120));
        let id = repo.batch.lock().unwrap().id;
        manager.resume_after_approval(id, true).await.unwrap();
        assert_eq!(repo.batch.lock().unwrap().processing_status, ProcessingStatus::Processing);
    }

    #[tokio::test]
    async fn rejection_transitions_to_failed_not_canceled() {
        let repo = FakeRepo { batch: Mutex::new(sample_batch(ProcessingStatus::WaitingForApproval)), rollback_delay: Duration::ZERO };
        let manager = BatchManager::new(&repo, Duration::from_secs(120));
        let id = repo.batch.lock().unwrap().id;
        manager.resume_after_approval(id, false).await.unwrap();
        assert_eq!(repo.batch.lock().unwrap().processing_status, ProcessingStatus::Failed);
    }
}
