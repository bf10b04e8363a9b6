//! Postgres-backed [`MatchDataSource`], raw `sqlx::query`/`query_as` (no
//! compile-time `query!` macro — there is no live database at build time).

use std::collections::HashMap;

use chrono::NaiveDate;
use model::{
    BankGoalTransaction, FundCode, FundTransaction, Money, Percent, ReconciliationStatus, ReconciliationVariance,
    ResolutionStatus, TransactionSource as TxnSource, TransactionType, Units, VarianceSeverity, VarianceType,
};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::MatchError;
use crate::passes::MatchKind;
use crate::runner::{GoalMatchResult, MatchDataSource};
use crate::variance_repo::{decision_resolution_status, VarianceDecision, VarianceRepository};

pub struct PgMatchDataSource {
    pool: PgPool,
}

impl PgMatchDataSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MatchDataSource for PgMatchDataSource {
    async fn goal_numbers_page(&self, start: NaiveDate, end: NaiveDate, limit: i64, offset: i64) -> Result<Vec<String>, MatchError> {
        let rows = sqlx::query(
            "SELECT DISTINCT goal_number FROM bank_goal_transactions \
             WHERE transaction_date BETWEEN $1 AND $2 \
             ORDER BY goal_number LIMIT $3 OFFSET $4",
        )
        .bind(start)
        .bind(end)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.get("goal_number")).collect())
    }

    async fn bank_transactions_for_goal(&self, goal_number: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<BankGoalTransaction>, MatchError> {
        let rows = sqlx::query(
            "SELECT id, bank_upload_batch_id, transaction_id, goal_number, account_number, client_name, \
                    transaction_date, transaction_type, total_amount, fund_percentages, fund_amounts, \
                    reconciliation_status, matched_goal_transaction_code, matching_score, review_tag, row_number \
             FROM bank_goal_transactions \
             WHERE goal_number = $1 AND transaction_date BETWEEN $2 AND $3",
        )
        .bind(goal_number)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_bank_goal_transaction).collect())
    }

    async fn fund_legs_for_goal(&self, goal_number: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<FundTransaction>, MatchError> {
        let rows = sqlx::query(
            "SELECT ft.id, ft.fund_transaction_id, ft.goal_transaction_code, ft.transaction_id, ft.source, \
                    ft.client_id, ft.account_id, ft.goal_id, ft.fund_id, ft.upload_batch_id, ft.transaction_date, \
                    ft.date_created, ft.transaction_type, ft.amount, ft.units, ft.bid, ft.mid, ft.offer, \
                    ft.price_date, ft.row_number \
             FROM fund_transactions ft \
             JOIN goals g ON g.id = ft.goal_id \
             WHERE g.goal_number = $1 AND ft.transaction_date BETWEEN $2 AND $3",
        )
        .bind(goal_number)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_fund_transaction).collect())
    }

    async fn fund_codes_by_id(&self) -> Result<HashMap<Uuid, FundCode>, MatchError> {
        let rows = sqlx::query("SELECT id, fund_code FROM funds").fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let id: Uuid = r.get("id");
                let raw: String = r.get("fund_code");
                FundCode::parse(&raw).map(|code| (id, code))
            })
            .collect())
    }

    async fn apply(&self, result: &GoalMatchResult) -> Result<(), MatchError> {
        let mut tx = self.pool.begin().await?;

        for m in &result.matches {
            let status = match m.kind {
                MatchKind::Exact => ReconciliationStatus::MatchedExact,
                MatchKind::Amount => ReconciliationStatus::MatchedAmount,
                MatchKind::SplitBankToFund | MatchKind::SplitFundToBank => ReconciliationStatus::MatchedSplit,
            };
            let fund_code = m.fund_codes.first().cloned();
            sqlx::query(
                "UPDATE bank_goal_transactions SET reconciliation_status = $1, matched_goal_transaction_code = $2, \
                 matching_score = $3 WHERE id = ANY($4)",
            )
            .bind(reconciliation_status_str(status))
            .bind(fund_code)
            .bind(m.confidence)
            .bind(&m.bank_ids)
            .execute(&mut *tx)
            .await?;
        }

        for (a, b) in &result.reversal_pairs {
            sqlx::query("UPDATE bank_goal_transactions SET reconciliation_status = $1 WHERE id = ANY($2)")
                .bind(reconciliation_status_str(ReconciliationStatus::ReversalNetted))
                .bind(vec![*a, *b])
                .execute(&mut *tx)
                .await?;
        }

        let netted: std::collections::HashSet<Uuid> = result.reversal_pairs.iter().flat_map(|(a, b)| [*a, *b]).collect();
        let still_missing: Vec<Uuid> = result.unmatched_bank.iter().copied().filter(|id| !netted.contains(id)).collect();
        if !still_missing.is_empty() {
            sqlx::query("UPDATE bank_goal_transactions SET reconciliation_status = $1 WHERE id = ANY($2)")
                .bind(reconciliation_status_str(ReconciliationStatus::MissingInFund))
                .bind(&still_missing)
                .execute(&mut *tx)
                .await?;
        }

        for v in &result.variances {
            insert_variance(&mut tx, v).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl VarianceRepository for PgMatchDataSource {
    async fn resolve(
        &self,
        variance_id: Uuid,
        decision: VarianceDecision,
        notes: Option<&str>,
        actor: &str,
    ) -> Result<(), MatchError> {
        sqlx::query(
            "UPDATE reconciliation_variances SET resolution_status = $1, reviewer = $2, notes = $3 \
             WHERE id = $4",
        )
        .bind(resolution_status_str(decision_resolution_status(decision)))
        .bind(actor)
        .bind(notes)
        .bind(variance_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

async fn insert_variance(tx: &mut sqlx::Transaction<'_, sqlx::Postgres>, v: &ReconciliationVariance) -> Result<(), MatchError> {
    sqlx::query(
        "INSERT INTO reconciliation_variances \
         (id, bank_goal_transaction_id, fund_goal_transaction_code, variance_type, severity, amount_delta, \
          date_delta_days, fund_code, fund_delta, resolution_status, auto_approved, reviewer, notes) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
    )
    .bind(v.id)
    .bind(v.bank_goal_transaction_id)
    .bind(&v.fund_goal_transaction_code)
    .bind(variance_type_str(v.variance_type))
    .bind(variance_severity_str(v.severity))
    .bind(v.amount_delta.map(|m| m.raw()))
    .bind(v.date_delta_days)
    .bind(v.fund_code.map(|c| c.as_str()))
    .bind(v.fund_delta.map(|m| m.raw()))
    .bind(resolution_status_str(v.resolution_status))
    .bind(v.auto_approved)
    .bind(&v.reviewer)
    .bind(&v.notes)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn row_to_bank_goal_transaction(row: sqlx::postgres::PgRow) -> BankGoalTransaction {
    let fund_percentages_json: serde_json::Value = row.get("fund_percentages");
    let fund_amounts_json: serde_json::Value = row.get("fund_amounts");
    BankGoalTransaction {
        id: row.get("id"),
        bank_upload_batch_id: row.get("bank_upload_batch_id"),
        transaction_id: row.get("transaction_id"),
        goal_number: row.get("goal_number"),
        account_number: row.get("account_number"),
        client_name: row.get("client_name"),
        transaction_date: row.get("transaction_date"),
        transaction_type: parse_transaction_type(row.get("transaction_type")),
        total_amount: Money::new(row.get("total_amount")),
        fund_percentages: parse_fund_percent_map(&fund_percentages_json),
        fund_amounts: parse_fund_money_map(&fund_amounts_json),
        reconciliation_status: parse_reconciliation_status(row.get("reconciliation_status")),
        matched_goal_transaction_code: row.get("matched_goal_transaction_code"),
        matching_score: row.get("matching_score"),
        review_tag: row.get("review_tag"),
        row_number: row.get::<i64, _>("row_number") as u64,
    }
}

fn row_to_fund_transaction(row: sqlx::postgres::PgRow) -> FundTransaction {
    FundTransaction {
        id: row.get("id"),
        fund_transaction_id: row.get("fund_transaction_id"),
        goal_transaction_code: row.get("goal_transaction_code"),
        transaction_id: row.get("transaction_id"),
        source: parse_transaction_source(row.get("source")),
        client_id: row.get("client_id"),
        account_id: row.get("account_id"),
        goal_id: row.get("goal_id"),
        fund_id: row.get("fund_id"),
        upload_batch_id: row.get("upload_batch_id"),
        transaction_date: row.get("transaction_date"),
        date_created: row.get("date_created"),
        transaction_type: parse_transaction_type(row.get("transaction_type")),
        amount: Money::new(row.get("amount")),
        units: Units::new(row.get("units")),
        bid: row.get("bid"),
        mid: row.get("mid"),
        offer: row.get("offer"),
        price_date: row.get("price_date"),
        row_number: row.get::<i64, _>("row_number") as u64,
    }
}

fn parse_fund_percent_map(value: &serde_json::Value) -> HashMap<FundCode, Percent> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| {
                    let code = FundCode::parse(k)?;
                    let fraction = v.as_f64()?;
                    Some((code, Percent::from_fraction(rust_decimal::Decimal::try_from(fraction).ok()?)))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_fund_money_map(value: &serde_json::Value) -> HashMap<FundCode, Money> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| {
                    let code = FundCode::parse(k)?;
                    let amount = v.as_f64()?;
                    Some((code, Money::new(rust_decimal::Decimal::try_from(amount).ok()?)))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_transaction_type(raw: String) -> TransactionType {
    match raw.as_str() {
        "withdrawal" => TransactionType::Withdrawal,
        "redemption" => TransactionType::Redemption,
        _ => TransactionType::Deposit,
    }
}

fn parse_transaction_source(raw: String) -> TxnSource {
    match raw.as_str() {
        "mobile" => TxnSource::Mobile,
        "web" => TxnSource::Web,
        "ussd" => TxnSource::UssD,
        "branch_cash" => TxnSource::BranchCash,
        "standing_order" => TxnSource::StandingOrder,
        _ => TxnSource::Bank,
    }
}

fn parse_reconciliation_status(raw: String) -> ReconciliationStatus {
    match raw.as_str() {
        "matched_exact" => ReconciliationStatus::MatchedExact,
        "matched_amount" => ReconciliationStatus::MatchedAmount,
        "matched_split" => ReconciliationStatus::MatchedSplit,
        "missing_in_fund" => ReconciliationStatus::MissingInFund,
        "reversal_netted" => ReconciliationStatus::ReversalNetted,
        _ => ReconciliationStatus::Unmatched,
    }
}

fn reconciliation_status_str(status: ReconciliationStatus) -> &'static str {
    match status {
        ReconciliationStatus::Unmatched => "unmatched",
        ReconciliationStatus::MatchedExact => "matched_exact",
        ReconciliationStatus::MatchedAmount => "matched_amount",
        ReconciliationStatus::MatchedSplit => "matched_split",
        ReconciliationStatus::MissingInFund => "missing_in_fund",
        ReconciliationStatus::ReversalNetted => "reversal_netted",
    }
}

fn variance_type_str(t: VarianceType) -> &'static str {
    match t {
        VarianceType::TotalAmountMismatch => "total_amount_mismatch",
        VarianceType::FundDistributionMismatch => "fund_distribution_mismatch",
        VarianceType::DateMismatch => "date_mismatch",
        VarianceType::MissingInBank => "missing_in_bank",
        VarianceType::MissingInFundSystem => "missing_in_fund_system",
    }
}

fn variance_severity_str(s: VarianceSeverity) -> &'static str {
    match s {
        VarianceSeverity::Low => "low",
        VarianceSeverity::Medium => "medium",
        VarianceSeverity::High => "high",
        VarianceSeverity::Critical => "critical",
    }
}

fn resolution_status_str(s: ResolutionStatus) -> &'static str {
    match s {
        ResolutionStatus::Open => "open",
        ResolutionStatus::AutoApproved => "auto_approved",
        ResolutionStatus::Approved => "approved",
        ResolutionStatus::Disputed => "disputed",
        ResolutionStatus::Investigating => "investigating",
    }
}
