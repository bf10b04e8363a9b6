//! Per-goal orchestration and the cross-goal batch runner behind
//! `smartMatch.run` (spec.md §4.L, §6): loads one goal's bank/fund rows,
//! runs the three passes, nets bank-to-bank reversals, generates
//! variances, and (optionally) persists the result through
//! [`MatchDataSource::apply`].

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use model::{BankGoalTransaction, Config, FundCode, FundTransaction, ReconciliationVariance};
use tokio::sync::watch;
use tracing::warn;
use uuid::Uuid;

use crate::error::MatchError;
use crate::passes::{run_passes, MatchRecord};
use crate::reversal::net_reversals;
use crate::types::FundGoalTxn;
use crate::variance::{auto_approve_per_pair, generate as generate_variances};

#[derive(Debug, Clone)]
pub struct GoalMatchResult {
    pub goal_number: String,
    pub matches: Vec<MatchRecord>,
    pub unmatched_bank: Vec<Uuid>,
    pub unmatched_fund: Vec<String>,
    pub reversal_pairs: Vec<(Uuid, Uuid)>,
    pub variances: Vec<ReconciliationVariance>,
}

/// Matches one goal's bank rows against its fund legs. Callers are
/// responsible for scoping both inputs to the goal and date window —
/// this function assumes homogeneity and does no further filtering.
pub fn match_goal(
    goal_number: &str,
    bank: Vec<BankGoalTransaction>,
    fund_legs: Vec<FundTransaction>,
    fund_codes: &HashMap<Uuid, FundCode>,
    config: &Config,
) -> GoalMatchResult {
    let fund = FundGoalTxn::group_all(fund_legs, fund_codes);
    let (matches, unmatched_bank, unmatched_fund) = run_passes(&bank, &fund, config);

    let reversal_pairs = net_reversals(&bank, &unmatched_bank);
    let netted: HashSet<Uuid> = reversal_pairs.iter().flat_map(|(a, b)| [*a, *b]).collect();

    let bank_by_id: HashMap<Uuid, BankGoalTransaction> = bank.into_iter().map(|b| (b.id, b)).collect();
    let fund_by_code: HashMap<String, FundGoalTxn> = fund.into_iter().map(|f| (f.goal_transaction_code.clone(), f)).collect();

    let mut variances = generate_variances(&matches, &unmatched_bank, &netted, &bank_by_id, &fund_by_code, &config.matcher);
    auto_approve_per_pair(&mut variances);

    GoalMatchResult {
        goal_number: goal_number.to_string(),
        matches,
        unmatched_bank,
        unmatched_fund,
        reversal_pairs,
        variances,
    }
}

/// Whatever stores bank/fund rows and can persist a completed match; the
/// Postgres implementation lives in [`crate::pg`].
#[async_trait::async_trait]
pub trait MatchDataSource: Send + Sync {
    async fn goal_numbers_page(&self, start: NaiveDate, end: NaiveDate, limit: i64, offset: i64) -> Result<Vec<String>, MatchError>;
    async fn bank_transactions_for_goal(&self, goal_number: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<BankGoalTransaction>, MatchError>;
    async fn fund_legs_for_goal(&self, goal_number: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<FundTransaction>, MatchError>;
    async fn fund_codes_by_id(&self) -> Result<HashMap<Uuid, FundCode>, MatchError>;
    async fn apply(&self, result: &GoalMatchResult) -> Result<(), MatchError>;
}

#[derive(Debug, Clone)]
pub struct BatchMatchRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub batch_size: i64,
    pub offset: i64,
    pub apply_updates: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BatchMatchReport {
    pub processed: u64,
    pub match_breakdown: HashMap<&'static str, u64>,
    pub has_more: bool,
    pub next_offset: i64,
}

/// Pages through goal numbers in `[startDate, endDate]`, matching each in
/// turn; checks `cancel` between goals so an operator-triggered run can be
/// stopped without losing the goals already processed (spec.md §7's
/// cooperative-cancellation requirement, mirroring the queue worker's
/// shutdown handling).
pub async fn run_batch(
    source: &dyn MatchDataSource,
    request: BatchMatchRequest,
    config: &Config,
    mut cancel: watch::Receiver<bool>,
) -> Result<BatchMatchReport, MatchError> {
    let goal_numbers = source.goal_numbers_page(request.start_date, request.end_date, request.batch_size, request.offset).await?;
    let has_more = goal_numbers.len() as i64 == request.batch_size;
    let fund_codes = source.fund_codes_by_id().await?;

    let mut processed = 0u64;
    let mut match_breakdown: HashMap<&'static str, u64> = HashMap::new();

    for goal_number in &goal_numbers {
        if *cancel.borrow() {
            break;
        }

        let bank = match source.bank_transactions_for_goal(goal_number, request.start_date, request.end_date).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(goal_number, error = %e, "matcher: failed to load bank rows, skipping goal");
                continue;
            }
        };
        let fund_legs = match source.fund_legs_for_goal(goal_number, request.start_date, request.end_date).await {
            Ok(legs) => legs,
            Err(e) => {
                warn!(goal_number, error = %e, "matcher: failed to load fund legs, skipping goal");
                continue;
            }
        };

        let result = match_goal(goal_number, bank, fund_legs, &fund_codes, config);
        for m in &result.matches {
            *match_breakdown.entry(m.kind.as_str()).or_insert(0) += 1;
        }

        if request.apply_updates {
            if let Err(e) = source.apply(&result).await {
                warn!(goal_number, error = %e, "matcher: failed to persist match result, skipping goal");
                continue;
            }
        }
        metrics::counter!("matcher_goals_processed_total").increment(1);
        processed += 1;
    }

    Ok(BatchMatchReport {
        processed,
        match_breakdown,
        has_more,
        next_offset: request.offset + goal_numbers.len() as i64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{Money, TransactionSource as Source, TransactionType, Units};
    use rust_decimal_macros::dec;

    fn bank_row(goal_number: &str, transaction_id: &str, amount: rust_decimal::Decimal, date: NaiveDate) -> BankGoalTransaction {
        BankGoalTransaction {
            id: Uuid::new_v4(),
            bank_upload_batch_id: Uuid::new_v4(),
            transaction_id: transaction_id.to_string(),
            goal_number: goal_number.to_string(),
            account_number: "701-807".to_string(),
            client_name: "Jane Doe".to_string(),
            transaction_date: date,
            transaction_type: TransactionType::Deposit,
            total_amount: Money::new(amount),
            fund_percentages: HashMap::new(),
            fund_amounts: HashMap::new(),
            reconciliation_status: model::ReconciliationStatus::Unmatched,
            matched_goal_transaction_code: None,
            matching_score: None,
            review_tag: None,
            row_number: 2,
        }
    }

    fn fund_leg(code: &str, transaction_id: &str, fund_id: Uuid, amount: rust_decimal::Decimal, date: NaiveDate) -> FundTransaction {
        FundTransaction {
            id: Uuid::new_v4(),
            fund_transaction_id: format!("{code}-leg"),
            goal_transaction_code: code.to_string(),
            transaction_id: transaction_id.to_string(),
            source: Source::Bank,
            client_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            goal_id: Uuid::new_v4(),
            fund_id,
            upload_batch_id: Uuid::new_v4(),
            transaction_date: date,
            date_created: chrono::Utc::now(),
            transaction_type: TransactionType::Deposit,
            amount: Money::new(amount),
            units: Units::new(amount),
            bid: dec!(12.40),
            mid: dec!(12.45),
            offer: dec!(12.50),
            price_date: date,
            row_number: 2,
        }
    }

    #[test]
    fn match_goal_produces_no_variances_for_a_clean_exact_match() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let fund_id = Uuid::new_v4();
        let bank = vec![bank_row("g1", "SHARED", dec!(100_000), date)];
        let fund_legs = vec![fund_leg("2025-06-01|701-807|g1", "SHARED", fund_id, dec!(100_000), date)];
        let mut fund_codes = HashMap::new();
        fund_codes.insert(fund_id, FundCode::Xummf);

        let result = match_goal("g1", bank, fund_legs, &fund_codes, &Config::default());
        assert_eq!(result.matches.len(), 1);
        assert!(result.unmatched_bank.is_empty());
        assert!(result.unmatched_fund.is_empty());
        assert!(result.variances.is_empty());
    }

    struct FakeSource {
        goal_numbers: Vec<String>,
        bank: HashMap<String, Vec<BankGoalTransaction>>,
        fund_legs: HashMap<String, Vec<FundTransaction>>,
        fund_codes: HashMap<Uuid, FundCode>,
        applied: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl MatchDataSource for FakeSource {
        async fn goal_numbers_page(&self, _start: NaiveDate, _end: NaiveDate, _limit: i64, _offset: i64) -> Result<Vec<String>, MatchError> {
            Ok(self.goal_numbers.clone())
        }
        async fn bank_transactions_for_goal(&self, goal_number: &str, _start: NaiveDate, _end: NaiveDate) -> Result<Vec<BankGoalTransaction>, MatchError> {
            Ok(self.bank.get(goal_number).cloned().unwrap_or_default())
        }
        async fn fund_legs_for_goal(&self, goal_number: &str, _start: NaiveDate, _end: NaiveDate) -> Result<Vec<FundTransaction>, MatchError> {
            Ok(self.fund_legs.get(goal_number).cloned().unwrap_or_default())
        }
        async fn fund_codes_by_id(&self) -> Result<HashMap<Uuid, FundCode>, MatchError> {
            Ok(self.fund_codes.clone())
        }
        async fn apply(&self, result: &GoalMatchResult) -> Result<(), MatchError> {
            self.applied.lock().unwrap().push(result.goal_number.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_batch_applies_every_goal_and_reports_breakdown() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let fund_id = Uuid::new_v4();
        let mut fund_codes = HashMap::new();
        fund_codes.insert(fund_id, FundCode::Xummf);

        let source = FakeSource {
            goal_numbers: vec!["g1".to_string()],
            bank: HashMap::from([("g1".to_string(), vec![bank_row("g1", "SHARED", dec!(100_000), date)])]),
            fund_legs: HashMap::from([("g1".to_string(), vec![fund_leg("2025-06-01|701-807|g1", "SHARED", fund_id, dec!(100_000), date)])]),
            fund_codes,
            applied: std::sync::Mutex::new(Vec::new()),
        };

        let (_tx, rx) = watch::channel(false);
        let request = BatchMatchRequest {
            start_date: date,
            end_date: date,
            batch_size: 50,
            offset: 0,
            apply_updates: true,
        };
        let report = run_batch(&source, request, &Config::default(), rx).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.match_breakdown.get("exact"), Some(&1));
        assert_eq!(source.applied.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_batch_stops_early_when_cancelled() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let source = FakeSource {
            goal_numbers: vec!["g1".to_string(), "g2".to_string()],
            bank: HashMap::new(),
            fund_legs: HashMap::new(),
            fund_codes: HashMap::new(),
            applied: std::sync::Mutex::new(Vec::new()),
        };
        let (tx, rx) = watch::channel(true);
        tx.send(true).unwrap();
        let request = BatchMatchRequest {
            start_date: date,
            end_date: date,
            batch_size: 50,
            offset: 0,
            apply_updates: true,
        };
        let report = run_batch(&source, request, &Config::default(), rx).await.unwrap();
        assert_eq!(report.processed, 0);
    }
}
