//! Postgres-backed [`BatchRepository`] and [`BatchWriteRepository`], raw
//! `sqlx::query`/`query_as` (no compile-time `query!` macro — there is no
//! live database at build time).

use std::collections::HashSet;

use model::{FundTransaction, Money, NewEntitiesStatus, ProcessingStatus, RowError, TransactionSource, TransactionType, UploadBatch, ValidationStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::BatchError;
use crate::manager::BatchRepository;
use crate::writer::BatchWriteRepository;

pub struct PgBatchRepository {
    pool: PgPool,
}

impl PgBatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BatchRepository for PgBatchRepository {
    async fn get(&self, batch_id: Uuid) -> Result<UploadBatch, BatchError> {
        let row = sqlx::query(
            "SELECT id, batch_number, file_name, file_size, file_path, processing_status, validation_status, \
                    total_records, processed_records, failed_records, validation_errors, validation_warnings, \
                    new_entities_report, new_entities_status, total_amount, created_at, processing_started_at, \
                    processing_completed_at, uploaded_by, approved_by \
             FROM upload_batches WHERE id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BatchError::NotFound(batch_id))?;
        Ok(row_to_upload_batch(row))
    }

    async fn set_status(&self, batch_id: Uuid, status: ProcessingStatus) -> Result<(), BatchError> {
        let now_column = match status {
            ProcessingStatus::Processing => Some("processing_started_at"),
            ProcessingStatus::Completed | ProcessingStatus::Failed | ProcessingStatus::Canceled => Some("processing_completed_at"),
            _ => None,
        };
        match now_column {
            Some(col) => {
                let sql = format!("UPDATE upload_batches SET processing_status = $1, {col} = NOW() WHERE id = $2");
                sqlx::query(&sql).bind(processing_status_str(status)).bind(batch_id).execute(&self.pool).await?;
            }
            None => {
                sqlx::query("UPDATE upload_batches SET processing_status = $1 WHERE id = $2")
                    .bind(processing_status_str(status))
                    .bind(batch_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn rollback_entities(&self, batch_id: Uuid) -> Result<(), BatchError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM fund_transactions WHERE upload_batch_id = $1").bind(batch_id).execute(&mut *tx).await?;

        sqlx::query(
            "DELETE FROM goals WHERE id NOT IN (SELECT DISTINCT goal_id FROM fund_transactions) \
             AND id NOT IN ( \
                SELECT DISTINCT g.id FROM goals g \
                JOIN accounts a ON a.id = g.account_id \
                JOIN bank_goal_transactions b ON b.account_number = a.account_number AND b.goal_number = g.goal_number \
             )",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM accounts WHERE id NOT IN (SELECT DISTINCT account_id FROM fund_transactions) \
             AND id NOT IN (SELECT DISTINCT account_id FROM goals)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "DELETE FROM clients WHERE id NOT IN (SELECT DISTINCT client_id FROM fund_transactions) \
             AND id NOT IN (SELECT DISTINCT client_id FROM accounts)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BatchWriteRepository for PgBatchRepository {
    async fn already_written_keys(&self, upload_batch_id: Uuid) -> Result<HashSet<(Uuid, u64)>, BatchError> {
        let rows = sqlx::query("SELECT row_number FROM fund_transactions WHERE upload_batch_id = $1")
            .bind(upload_batch_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| (upload_batch_id, r.get::<i64, _>("row_number") as u64)).collect())
    }

    async fn insert_chunk(&self, chunk: &[FundTransaction]) -> Result<(), BatchError> {
        let mut tx = self.pool.begin().await?;
        for t in chunk {
            sqlx::query(
                "INSERT INTO fund_transactions \
                 (id, fund_transaction_id, goal_transaction_code, transaction_id, source, client_id, account_id, \
                  goal_id, fund_id, upload_batch_id, transaction_date, date_created, transaction_type, amount, \
                  units, bid, mid, offer, price_date, row_number) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20) \
                 ON CONFLICT (upload_batch_id, row_number) DO NOTHING",
            )
            .bind(t.id)
            .bind(&t.fund_transaction_id)
            .bind(&t.goal_transaction_code)
            .bind(&t.transaction_id)
            .bind(transaction_source_str(t.source))
            .bind(t.client_id)
            .bind(t.account_id)
            .bind(t.goal_id)
            .bind(t.fund_id)
            .bind(t.upload_batch_id)
            .bind(t.transaction_date)
            .bind(t.date_created)
            .bind(transaction_type_str(t.transaction_type))
            .bind(t.amount.raw())
            .bind(t.units.raw())
            .bind(t.bid)
            .bind(t.mid)
            .bind(t.offer)
            .bind(t.price_date)
            .bind(t.row_number as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn row_to_upload_batch(row: sqlx::postgres::PgRow) -> UploadBatch {
    let errors_json: serde_json::Value = row.get("validation_errors");
    let warnings_json: serde_json::Value = row.get("validation_warnings");
    UploadBatch {
        id: row.get("id"),
        batch_number: row.get("batch_number"),
        file_name: row.get("file_name"),
        file_size: row.get::<i64, _>("file_size") as u64,
        file_path: row.get("file_path"),
        processing_status: parse_processing_status(row.get("processing_status")),
        validation_status: parse_validation_status(row.get("validation_status")),
        total_records: row.get::<i64, _>("total_records") as u64,
        processed_records: row.get::<i64, _>("processed_records") as u64,
        failed_records: row.get::<i64, _>("failed_records") as u64,
        validation_errors: serde_json::from_value::<Vec<RowError>>(errors_json).unwrap_or_default(),
        validation_warnings: serde_json::from_value::<Vec<RowError>>(warnings_json).unwrap_or_default(),
        new_entities_report: row.get("new_entities_report"),
        new_entities_status: parse_new_entities_status(row.get("new_entities_status")),
        total_amount: Money::new(row.get("total_amount")),
        created_at: row.get("created_at"),
        processing_started_at: row.get("processing_started_at"),
        processing_completed_at: row.get("processing_completed_at"),
        uploaded_by: row.get("uploaded_by"),
        approved_by: row.get("approved_by"),
    }
}

fn processing_status_str(s: ProcessingStatus) -> &'static str {
    match s {
        ProcessingStatus::Queued => "queued",
        ProcessingStatus::Parsing => "parsing",
        ProcessingStatus::Validating => "validating",
        ProcessingStatus::Processing => "processing",
        ProcessingStatus::Completed => "completed",
        ProcessingStatus::Failed => "failed",
        ProcessingStatus::WaitingForApproval => "waiting_for_approval",
        ProcessingStatus::Canceled => "canceled",
    }
}

fn parse_processing_status(raw: String) -> ProcessingStatus {
    match raw.as_str() {
        "parsing" => ProcessingStatus::Parsing,
        "validating" => ProcessingStatus::Validating,
        "processing" => ProcessingStatus::Processing,
        "completed" => ProcessingStatus::Completed,
        "failed" => ProcessingStatus::Failed,
        "waiting_for_approval" => ProcessingStatus::WaitingForApproval,
        "canceled" => ProcessingStatus::Canceled,
        _ => ProcessingStatus::Queued,
    }
}

fn parse_validation_status(raw: String) -> ValidationStatus {
    match raw.as_str() {
        "passed" => ValidationStatus::Passed,
        "passed_with_warnings" => ValidationStatus::PassedWithWarnings,
        "failed" => ValidationStatus::Failed,
        _ => ValidationStatus::Pending,
    }
}

fn parse_new_entities_status(raw: String) -> NewEntitiesStatus {
    match raw.as_str() {
        "pending" => NewEntitiesStatus::Pending,
        "approved" => NewEntitiesStatus::Approved,
        "rejected" => NewEntitiesStatus::Rejected,
        _ => NewEntitiesStatus::None,
    }
}

fn transaction_type_str(t: TransactionType) -> &'static str {
    match t {
        TransactionType::Deposit => "deposit",
        TransactionType::Withdrawal => "withdrawal",
        TransactionType::Redemption => "redemption",
    }
}

fn transaction_source_str(s: TransactionSource) -> &'static str {
    match s {
        TransactionSource::Bank => "bank",
        TransactionSource::Mobile => "mobile",
        TransactionSource::Web => "web",
        TransactionSource::UssD => "ussd",
        TransactionSource::BranchCash => "branch_cash",
        TransactionSource::StandingOrder => "standing_order",
    }
}
