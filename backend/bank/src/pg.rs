//! Postgres-backed [`BankRepository`], raw `sqlx::query`/`query_as` (no
//! compile-time `query!` macro — there is no live database at build time).

use std::collections::HashMap;

use model::{
    BankGoalTransaction, BankUploadBatch, FundCode, Goal, GoalStatus, GoalType, Money, Percent, ProcessingStatus,
    ReconciliationStatus, RiskTolerance, RowError, TransactionType, ValidationStatus,
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::BankError;
use crate::repository::BankRepository;

pub struct PgBankRepository {
    pool: PgPool,
}

impl PgBankRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl BankRepository for PgBankRepository {
    async fn get(&self, batch_id: Uuid) -> Result<BankUploadBatch, BankError> {
        let row = sqlx::query(
            "SELECT id, batch_number, file_name, file_size, file_path, processing_status, validation_status, \
                    total_records, processed_records, failed_records, validation_errors, validation_warnings, \
                    created_at, processing_started_at, processing_completed_at, uploaded_by \
             FROM bank_upload_batches WHERE id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BankError::NotFound(batch_id))?;

        let errors_json: serde_json::Value = row.get("validation_errors");
        let warnings_json: serde_json::Value = row.get("validation_warnings");
        Ok(BankUploadBatch {
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
            validation_errors: serde_json::from_value(errors_json).unwrap_or_default(),
            validation_warnings: serde_json::from_value(warnings_json).unwrap_or_default(),
            created_at: row.get("created_at"),
            processing_started_at: row.get("processing_started_at"),
            processing_completed_at: row.get("processing_completed_at"),
            uploaded_by: row.get("uploaded_by"),
        })
    }

    async fn record_validation_result(
        &self,
        batch_id: Uuid,
        total_records: u64,
        processed_records: u64,
        failed_records: u64,
        errors: &[RowError],
        warnings: &[RowError],
        status: ValidationStatus,
    ) -> Result<(), BankError> {
        sqlx::query(
            "UPDATE bank_upload_batches SET total_records = $1, processed_records = $2, failed_records = $3, \
             validation_errors = $4, validation_warnings = $5, validation_status = $6 WHERE id = $7",
        )
        .bind(total_records as i64)
        .bind(processed_records as i64)
        .bind(failed_records as i64)
        .bind(serde_json::to_value(errors).unwrap_or_default())
        .bind(serde_json::to_value(warnings).unwrap_or_default())
        .bind(validation_status_str(status))
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_upload_batch(&self, batch: &BankUploadBatch) -> Result<(), BankError> {
        sqlx::query(
            "INSERT INTO bank_upload_batches \
             (id, batch_number, file_name, file_size, file_path, processing_status, validation_status, \
              total_records, processed_records, failed_records, validation_errors, validation_warnings, \
              created_at, processing_started_at, processing_completed_at, uploaded_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(batch.id)
        .bind(&batch.batch_number)
        .bind(&batch.file_name)
        .bind(batch.file_size as i64)
        .bind(&batch.file_path)
        .bind(processing_status_str(batch.processing_status))
        .bind(validation_status_str(batch.validation_status))
        .bind(batch.total_records as i64)
        .bind(batch.processed_records as i64)
        .bind(batch.failed_records as i64)
        .bind(serde_json::to_value(&batch.validation_errors).unwrap_or_default())
        .bind(serde_json::to_value(&batch.validation_warnings).unwrap_or_default())
        .bind(batch.created_at)
        .bind(batch.processing_started_at)
        .bind(batch.processing_completed_at)
        .bind(&batch.uploaded_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, batch_id: Uuid, status: ProcessingStatus) -> Result<(), BankError> {
        sqlx::query("UPDATE bank_upload_batches SET processing_status = $1 WHERE id = $2")
            .bind(processing_status_str(status))
            .bind(batch_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_goal_transactions(&self, rows: &[BankGoalTransaction]) -> Result<(), BankError> {
        let mut tx = self.pool.begin().await?;
        for r in rows {
            sqlx::query(
                "INSERT INTO bank_goal_transactions \
                 (id, bank_upload_batch_id, transaction_id, goal_number, account_number, client_name, \
                  transaction_date, transaction_type, total_amount, fund_percentages, fund_amounts, \
                  reconciliation_status, matched_goal_transaction_code, matching_score, review_tag, row_number) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
                 ON CONFLICT (bank_upload_batch_id, row_number) DO NOTHING",
            )
            .bind(r.id)
            .bind(r.bank_upload_batch_id)
            .bind(&r.transaction_id)
            .bind(&r.goal_number)
            .bind(&r.account_number)
            .bind(&r.client_name)
            .bind(r.transaction_date)
            .bind(transaction_type_str(r.transaction_type))
            .bind(r.total_amount.raw())
            .bind(fund_percent_map_json(&r.fund_percentages))
            .bind(fund_money_map_json(&r.fund_amounts))
            .bind(reconciliation_status_str(r.reconciliation_status))
            .bind(&r.matched_goal_transaction_code)
            .bind(r.matching_score)
            .bind(&r.review_tag)
            .bind(r.row_number as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn account_ids_by_number(&self) -> Result<HashMap<String, Uuid>, BankError> {
        let rows = sqlx::query("SELECT id, account_number FROM accounts").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| (r.get("account_number"), r.get("id"))).collect())
    }

    async fn goals_by_key(&self) -> Result<HashMap<String, Goal>, BankError> {
        let rows = sqlx::query(
            "SELECT g.id, g.account_id, g.goal_number, g.title, g.goal_type, g.risk_tolerance, \
                    g.fund_distribution, g.status, a.account_number \
             FROM goals g JOIN accounts a ON a.id = g.account_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| {
                let account_number: String = r.get("account_number");
                let goal_number: String = r.get("goal_number");
                let key = format!("{account_number}|{goal_number}");
                let distribution_json: serde_json::Value = r.get("fund_distribution");
                let goal = Goal {
                    id: r.get("id"),
                    account_id: r.get("account_id"),
                    goal_number,
                    title: r.get("title"),
                    goal_type: parse_goal_type(r.get("goal_type")),
                    risk_tolerance: parse_risk_tolerance(r.get("risk_tolerance")),
                    fund_distribution: serde_json::from_value(distribution_json).unwrap_or_default(),
                    status: parse_goal_status(r.get("status")),
                };
                (key, goal)
            })
            .collect())
    }
}

fn fund_percent_map_json(map: &HashMap<FundCode, Percent>) -> serde_json::Value {
    let obj: serde_json::Map<String, serde_json::Value> = map
        .iter()
        .map(|(code, pct)| (code.as_str().to_string(), serde_json::json!(pct.value().to_string())))
        .collect();
    serde_json::Value::Object(obj)
}

fn fund_money_map_json(map: &HashMap<FundCode, Money>) -> serde_json::Value {
    let obj: serde_json::Map<String, serde_json::Value> = map
        .iter()
        .map(|(code, amount)| (code.as_str().to_string(), serde_json::json!(amount.raw().to_string())))
        .collect();
    serde_json::Value::Object(obj)
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

fn validation_status_str(s: ValidationStatus) -> &'static str {
    match s {
        ValidationStatus::Pending => "pending",
        ValidationStatus::Passed => "passed",
        ValidationStatus::PassedWithWarnings => "passed_with_warnings",
        ValidationStatus::Failed => "failed",
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

fn transaction_type_str(t: TransactionType) -> &'static str {
    match t {
        TransactionType::Deposit => "deposit",
        TransactionType::Withdrawal => "withdrawal",
        TransactionType::Redemption => "redemption",
    }
}

fn reconciliation_status_str(s: ReconciliationStatus) -> &'static str {
    match s {
        ReconciliationStatus::Unmatched => "unmatched",
        ReconciliationStatus::MatchedExact => "matched_exact",
        ReconciliationStatus::MatchedAmount => "matched_amount",
        ReconciliationStatus::MatchedSplit => "matched_split",
        ReconciliationStatus::MissingInFund => "missing_in_fund",
        ReconciliationStatus::ReversalNetted => "reversal_netted",
    }
}

fn parse_goal_type(raw: String) -> GoalType {
    match raw.as_str() {
        "education" => GoalType::Education,
        "retirement" => GoalType::Retirement,
        "emergency" => GoalType::Emergency,
        "wealth" => GoalType::Wealth,
        _ => GoalType::Other,
    }
}

fn parse_risk_tolerance(raw: String) -> RiskTolerance {
    match raw.as_str() {
        "conservative" => RiskTolerance::Conservative,
        "aggressive" => RiskTolerance::Aggressive,
        _ => RiskTolerance::Moderate,
    }
}

fn parse_goal_status(raw: String) -> GoalStatus {
    match raw.as_str() {
        "closed" => GoalStatus::Closed,
        _ => GoalStatus::Active,
    }
}
