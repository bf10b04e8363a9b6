//! Ad hoc queries the worker needs that don't belong to any single
//! domain crate's repository trait: upload-batch header writes, and the
//! master-table snapshots the entity detector, writer, and creator all
//! read from (spec.md §4.E-§4.G). Raw `sqlx::query`/`query_as`, same as
//! every other `pg.rs` in this workspace — there is no live database at
//! build time for the `query!` macro to check against.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use entities::KnownEntities;
use model::{
    FundCode, Goal, GoalStatus, GoalType, NewEntitiesStatus, ProcessingStatus, RiskTolerance, RowError,
    UploadBatch, ValidationStatus,
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct WorkerFundRepo {
    pool: PgPool,
}

impl WorkerFundRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Not sequential across restarts — uniqueness, not ordering, is what
    /// `upload_batches.batch_number` needs.
    pub fn generate_batch_number(prefix: &str) -> String {
        format!("{prefix}-{}", Utc::now().format("%Y%m%d%H%M%S%6f"))
    }

    pub async fn insert_upload_batch(&self, batch: &UploadBatch) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO upload_batches \
             (id, batch_number, file_name, file_size, file_path, processing_status, validation_status, \
              total_records, processed_records, failed_records, validation_errors, validation_warnings, \
              new_entities_report, new_entities_status, total_amount, created_at, processing_started_at, \
              processing_completed_at, uploaded_by, approved_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
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
        .bind(serde_json::to_value(&batch.validation_errors)?)
        .bind(serde_json::to_value(&batch.validation_warnings)?)
        .bind(&batch.new_entities_report)
        .bind(new_entities_status_str(batch.new_entities_status))
        .bind(batch.total_amount.raw())
        .bind(batch.created_at)
        .bind(batch.processing_started_at)
        .bind(batch.processing_completed_at)
        .bind(&batch.uploaded_by)
        .bind(&batch.approved_by)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_validation_result(
        &self,
        batch_id: Uuid,
        total_records: u64,
        processed_records: u64,
        failed_records: u64,
        errors: &[RowError],
        warnings: &[RowError],
        status: ValidationStatus,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE upload_batches SET total_records = $1, processed_records = $2, failed_records = $3, \
             validation_errors = $4, validation_warnings = $5, validation_status = $6 WHERE id = $7",
        )
        .bind(total_records as i64)
        .bind(processed_records as i64)
        .bind(failed_records as i64)
        .bind(serde_json::to_value(errors)?)
        .bind(serde_json::to_value(warnings)?)
        .bind(validation_status_str(status))
        .bind(batch_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn record_total_amount(&self, batch_id: Uuid, total_amount: model::Money) -> anyhow::Result<()> {
        sqlx::query("UPDATE upload_batches SET total_amount = $1 WHERE id = $2")
            .bind(total_amount.raw())
            .bind(batch_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_new_entities(
        &self,
        batch_id: Uuid,
        report: Option<serde_json::Value>,
        status: NewEntitiesStatus,
    ) -> anyhow::Result<()> {
        sqlx::query("UPDATE upload_batches SET new_entities_report = $1, new_entities_status = $2 WHERE id = $3")
            .bind(report)
            .bind(new_entities_status_str(status))
            .bind(batch_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_approval(&self, batch_id: Uuid, actor: &str, approved: bool) -> anyhow::Result<()> {
        let status = if approved { NewEntitiesStatus::Approved } else { NewEntitiesStatus::Rejected };
        sqlx::query("UPDATE upload_batches SET new_entities_status = $1, approved_by = $2 WHERE id = $3")
            .bind(new_entities_status_str(status))
            .bind(actor)
            .bind(batch_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_fund_transactions(&self, upload_batch_id: Uuid) -> anyhow::Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM fund_transactions WHERE upload_batch_id = $1")
            .bind(upload_batch_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    /// `accountNumber|goalNumber -> Goal`, for the row/group validator's
    /// existing-distribution check and for the batch writer's foreign-key
    /// resolution.
    pub async fn existing_goals_by_key(&self) -> anyhow::Result<HashMap<String, Goal>> {
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

    pub async fn known_entities(&self) -> anyhow::Result<KnownEntities> {
        let client_names: HashSet<String> = sqlx::query("SELECT name FROM clients")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| r.get("name"))
            .collect();
        let account_numbers: HashSet<String> = sqlx::query("SELECT account_number FROM accounts")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| r.get("account_number"))
            .collect();
        let goal_keys: HashSet<String> = sqlx::query(
            "SELECT a.account_number, g.goal_number FROM goals g JOIN accounts a ON a.id = g.account_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| {
            let account_number: String = r.get("account_number");
            let goal_number: String = r.get("goal_number");
            format!("{account_number}|{goal_number}")
        })
        .collect();

        Ok(KnownEntities { client_names, account_numbers, goal_keys })
    }

    pub async fn funds_by_code(&self) -> anyhow::Result<HashMap<FundCode, Uuid>> {
        let rows = sqlx::query("SELECT id, fund_code FROM funds").fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let id: Uuid = r.get("id");
                let raw: String = r.get("fund_code");
                FundCode::parse(&raw).map(|code| (code, id))
            })
            .collect())
    }

    /// Full snapshot of clients/accounts/goals, for [`batch::EntityLookup`]
    /// once entity creation for a batch has settled. Same full-rebuild
    /// shape as the aggregate refresher: correctness over incrementalism.
    pub async fn entity_lookup(&self) -> anyhow::Result<batch::EntityLookup> {
        let clients_by_name: HashMap<String, model::Client> = sqlx::query("SELECT id, name, status FROM clients")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|r| {
                let name: String = r.get("name");
                (
                    name.clone(),
                    model::Client { id: r.get("id"), name, status: parse_client_status(r.get("status")) },
                )
            })
            .collect();

        let accounts_by_number: HashMap<String, model::Account> = sqlx::query(
            "SELECT id, client_id, account_number, account_type, category, sponsor_code, status, opened_at FROM accounts",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|r| {
            let account_number: String = r.get("account_number");
            (
                account_number.clone(),
                model::Account {
                    id: r.get("id"),
                    client_id: r.get("client_id"),
                    account_number,
                    account_type: parse_account_type(r.get("account_type")),
                    category: parse_account_category(r.get("category")),
                    sponsor_code: r.get("sponsor_code"),
                    status: parse_account_status(r.get("status")),
                    opened_at: r.get("opened_at"),
                },
            )
        })
        .collect();

        let goals_by_key = self.existing_goals_by_key().await?;
        let funds_by_code = self.funds_by_code().await?;

        Ok(batch::EntityLookup { clients_by_name, accounts_by_number, goals_by_key, funds_by_code })
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

fn validation_status_str(s: ValidationStatus) -> &'static str {
    match s {
        ValidationStatus::Pending => "pending",
        ValidationStatus::Passed => "passed",
        ValidationStatus::PassedWithWarnings => "passed_with_warnings",
        ValidationStatus::Failed => "failed",
    }
}

fn new_entities_status_str(s: NewEntitiesStatus) -> &'static str {
    match s {
        NewEntitiesStatus::None => "none",
        NewEntitiesStatus::Pending => "pending",
        NewEntitiesStatus::Approved => "approved",
        NewEntitiesStatus::Rejected => "rejected",
    }
}

fn parse_client_status(raw: String) -> model::ClientStatus {
    match raw.as_str() {
        "inactive" => model::ClientStatus::Inactive,
        _ => model::ClientStatus::Active,
    }
}

fn parse_account_type(raw: String) -> model::AccountType {
    match raw.as_str() {
        "pooled" => model::AccountType::Pooled,
        "joint" => model::AccountType::Joint,
        "linked" => model::AccountType::Linked,
        _ => model::AccountType::Personal,
    }
}

fn parse_account_category(raw: String) -> model::AccountCategory {
    match raw.as_str() {
        "family" => model::AccountCategory::Family,
        "investment_clubs" => model::AccountCategory::InvestmentClubs,
        "retirements_benefit_scheme" => model::AccountCategory::RetirementsBenefitScheme,
        _ => model::AccountCategory::General,
    }
}

fn parse_account_status(raw: String) -> model::AccountStatus {
    match raw.as_str() {
        "inactive" => model::AccountStatus::Inactive,
        _ => model::AccountStatus::Active,
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
