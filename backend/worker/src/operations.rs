//! Operator operations (spec.md §6): typed async functions instead of
//! HTTP handlers, grouped the way `backend/api/src/handlers` groups its
//! endpoints by resource — there is no HTTP surface here, an embedding
//! caller (a CLI, an internal RPC layer, a test) invokes these directly.

use std::time::Duration;

use bank::BankRepository;
use batch::BatchRepository;
use chrono::{NaiveDate, Utc};
use entities::NewEntitiesReport;
use matcher::{BatchMatchReport, BatchMatchRequest, VarianceDecision, VarianceRepository};
use model::{NewEntitiesStatus, ProcessingStatus, UploadBatch};
use queue::{JobName, QueueRepository};
use tokio::sync::watch;
use uuid::Uuid;

use crate::context::AppContext;

pub mod upload_batch {
    use super::*;

    #[derive(Debug, Clone, serde::Serialize)]
    pub struct StatusView {
        pub processing_status: ProcessingStatus,
        pub validation_status: model::ValidationStatus,
        pub total_records: u64,
        pub processed_records: u64,
        pub failed_records: u64,
    }

    #[derive(Debug, Clone, serde::Serialize, Default)]
    pub struct RollbackReport {
        pub deleted_fund_transactions: u64,
    }

    /// `uploadBatch.create(file) -> batchId`: writes the batch header row
    /// in `queued` state and enqueues `process-new-upload`, returning
    /// immediately (spec.md §6's 202-style contract).
    pub async fn create(
        ctx: &AppContext,
        file_name: &str,
        file_path: &str,
        file_size: u64,
        uploaded_by: &str,
    ) -> anyhow::Result<Uuid> {
        let batch_id = Uuid::new_v4();
        let batch = UploadBatch {
            id: batch_id,
            batch_number: crate::repo::WorkerFundRepo::generate_batch_number("FB"),
            file_name: file_name.to_string(),
            file_size,
            file_path: file_path.to_string(),
            processing_status: ProcessingStatus::Queued,
            validation_status: model::ValidationStatus::Pending,
            total_records: 0,
            processed_records: 0,
            failed_records: 0,
            validation_errors: vec![],
            validation_warnings: vec![],
            new_entities_report: None,
            new_entities_status: NewEntitiesStatus::None,
            total_amount: model::Money::zero(),
            created_at: Utc::now(),
            processing_started_at: None,
            processing_completed_at: None,
            uploaded_by: uploaded_by.to_string(),
            approved_by: None,
        };
        ctx.fund_repo.insert_upload_batch(&batch).await?;

        let payload = serde_json::json!({ "batchId": batch_id, "filePath": file_path, "enqueuedAt": Utc::now() });
        ctx.queue_repo
            .enqueue(JobName::ProcessNewUpload, payload, Utc::now(), ctx.config.queue.max_attempts)
            .await?;
        Ok(batch_id)
    }

    pub async fn status(ctx: &AppContext, batch_id: Uuid) -> anyhow::Result<StatusView> {
        let batch = ctx.batch_repo.get(batch_id).await?;
        Ok(StatusView {
            processing_status: batch.processing_status,
            validation_status: batch.validation_status,
            total_records: batch.total_records,
            processed_records: batch.processed_records,
            failed_records: batch.failed_records,
        })
    }

    /// `uploadBatch.summary(batchId) -> full summary`: the whole batch
    /// row, errors and warnings included (capping to first 50/100 is a
    /// presentation concern for whatever surfaces this, not a storage one
    /// per spec.md §6).
    pub async fn summary(ctx: &AppContext, batch_id: Uuid) -> anyhow::Result<UploadBatch> {
        Ok(ctx.batch_repo.get(batch_id).await?)
    }

    pub async fn cancel(ctx: &AppContext, batch_id: Uuid) -> anyhow::Result<()> {
        let manager = batch::BatchManager::new(&ctx.batch_repo, Duration::from_secs(ctx.config.batch.rollback_timeout_seconds));
        manager.cancel(batch_id).await?;
        Ok(())
    }

    pub async fn rollback(ctx: &AppContext, batch_id: Uuid) -> anyhow::Result<RollbackReport> {
        let deleted = ctx.fund_repo.count_fund_transactions(batch_id).await?;
        let manager = batch::BatchManager::new(&ctx.batch_repo, Duration::from_secs(ctx.config.batch.rollback_timeout_seconds));
        manager.rollback(batch_id).await?;
        ctx.refresh_aggregates().await?;
        Ok(RollbackReport { deleted_fund_transactions: deleted })
    }

    pub async fn new_entities(ctx: &AppContext, batch_id: Uuid) -> anyhow::Result<NewEntitiesReport> {
        let batch = ctx.batch_repo.get(batch_id).await?;
        match batch.new_entities_report {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(NewEntitiesReport::default()),
        }
    }

    /// `uploadBatch.approveEntities(batchId, { decision, actor })`: enqueues
    /// `resume-after-approval` rather than acting inline, so entity
    /// creation still runs on the worker's queue (retries, backoff,
    /// concurrency limits all apply the same as any other job).
    pub async fn approve_entities(ctx: &AppContext, batch_id: Uuid, approved: bool, actor: &str) -> anyhow::Result<()> {
        let payload = serde_json::json!({ "batchId": batch_id, "approved": approved, "actor": actor, "enqueuedAt": Utc::now() });
        ctx.queue_repo
            .enqueue(JobName::ResumeAfterApproval, payload, Utc::now(), ctx.config.queue.max_attempts)
            .await?;
        Ok(())
    }
}

/// Symmetric entry point for the bank feed: spec.md §6 only names the
/// fund-side `uploadBatch.*` operations, but the `process-bank-upload`
/// job name in its job record implies an equivalent intake call.
pub mod bank_upload_batch {
    use super::*;

    pub async fn create(
        ctx: &AppContext,
        file_name: &str,
        file_path: &str,
        file_size: u64,
        uploaded_by: &str,
    ) -> anyhow::Result<Uuid> {
        let batch_id = Uuid::new_v4();
        let batch = model::BankUploadBatch {
            id: batch_id,
            batch_number: crate::repo::WorkerFundRepo::generate_batch_number("BB"),
            file_name: file_name.to_string(),
            file_size,
            file_path: file_path.to_string(),
            processing_status: ProcessingStatus::Queued,
            validation_status: model::ValidationStatus::Pending,
            total_records: 0,
            processed_records: 0,
            failed_records: 0,
            validation_errors: vec![],
            validation_warnings: vec![],
            created_at: Utc::now(),
            processing_started_at: None,
            processing_completed_at: None,
            uploaded_by: uploaded_by.to_string(),
        };
        ctx.bank_repo.insert_upload_batch(&batch).await?;

        let payload = serde_json::json!({ "batchId": batch_id, "filePath": file_path, "enqueuedAt": Utc::now() });
        ctx.queue_repo
            .enqueue(JobName::ProcessBankUpload, payload, Utc::now(), ctx.config.queue.max_attempts)
            .await?;
        Ok(batch_id)
    }

    pub async fn status(ctx: &AppContext, batch_id: Uuid) -> anyhow::Result<model::BankUploadBatch> {
        Ok(ctx.bank_repo.get(batch_id).await?)
    }
}

pub mod smart_match {
    use super::*;

    /// `smartMatch.run({ startDate, endDate, batchSize, offset,
    /// applyUpdates }) -> { processed, matchBreakdown, hasMore,
    /// nextOffset }`. `cancel` lets the caller stop the run between goals
    /// (spec.md §4.L); pass a receiver that never flips for a run-to-completion call.
    pub async fn run(
        ctx: &AppContext,
        start_date: NaiveDate,
        end_date: NaiveDate,
        batch_size: i64,
        offset: i64,
        apply_updates: bool,
        cancel: watch::Receiver<bool>,
    ) -> anyhow::Result<BatchMatchReport> {
        let request = BatchMatchRequest { start_date, end_date, batch_size, offset, apply_updates };
        let report = matcher::run_batch(&ctx.match_source, request, &ctx.config, cancel).await?;
        Ok(report)
    }
}

pub mod variance {
    use super::*;

    /// `variance.resolve(varianceId, { decision, notes, actor })`.
    pub async fn resolve(
        ctx: &AppContext,
        variance_id: Uuid,
        decision: VarianceDecision,
        notes: Option<&str>,
        actor: &str,
    ) -> anyhow::Result<()> {
        ctx.match_source.resolve(variance_id, decision, notes, actor).await?;
        Ok(())
    }
}
