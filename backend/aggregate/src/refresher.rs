//! Aggregate Refresher (spec.md §4.J): recomputes both aggregates from the
//! full set of persisted `FundTransaction`s and swaps them into place
//! behind an `RwLock`, so readers never observe a partially-rebuilt
//! aggregate and never block a reader on a writer for longer than the
//! swap itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use model::{FundCode, FundTransaction};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::AggregateError;
use crate::price_cache::PriceProvider;
use crate::types::{AccountUnitBalanceRow, AccountUnitBalancesAggregate, FundLeg, GoalTransactionAggregateRow, GoalTransactionsAggregate};

#[async_trait::async_trait]
pub trait TransactionSource: Send + Sync {
    async fn all_fund_transactions(&self) -> Result<Vec<FundTransaction>, AggregateError>;
    /// Fund master lookup; aggregates are keyed by fund code, transactions
    /// only carry the fund's surrogate id.
    async fn fund_codes_by_id(&self) -> Result<std::collections::HashMap<uuid::Uuid, model::FundCode>, AggregateError>;
}

pub struct AggregateStore {
    goal_transactions: RwLock<Arc<GoalTransactionsAggregate>>,
    unit_balances: RwLock<Arc<AccountUnitBalancesAggregate>>,
}

impl Default for AggregateStore {
    fn default() -> Self {
        Self {
            goal_transactions: RwLock::new(Arc::new(GoalTransactionsAggregate::default())),
            unit_balances: RwLock::new(Arc::new(AccountUnitBalancesAggregate::default())),
        }
    }
}

impl AggregateStore {
    pub async fn goal_transactions(&self) -> Arc<GoalTransactionsAggregate> {
        self.goal_transactions.read().await.clone()
    }

    pub async fn unit_balances(&self) -> Arc<AccountUnitBalancesAggregate> {
        self.unit_balances.read().await.clone()
    }

    async fn swap(&self, goal_transactions: GoalTransactionsAggregate, unit_balances: AccountUnitBalancesAggregate) {
        *self.goal_transactions.write().await = Arc::new(goal_transactions);
        *self.unit_balances.write().await = Arc::new(unit_balances);
    }
}

/// Rebuilds both aggregates from `source` within `timeout`, reporting
/// duration and outcome via the `metrics` facade (no HTTP exporter here —
/// that's the operator's scrape endpoint to wire up). `prices` values each
/// account's unit balances at the latest known price per fund; a fund with
/// no known price is simply left unvalued rather than failing the refresh.
pub async fn refresh(
    store: &AggregateStore,
    source: &dyn TransactionSource,
    prices: &dyn PriceProvider,
    timeout: Duration,
) -> Result<(), AggregateError> {
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, async {
        let transactions = source.all_fund_transactions().await?;
        let fund_codes = source.fund_codes_by_id().await?;
        Ok::<_, AggregateError>((transactions, fund_codes))
    })
    .await;

    let (transactions, fund_codes) = match result {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            metrics::counter!("aggregate_refresh_failures_total").increment(1);
            return Err(e);
        }
        Err(_) => {
            metrics::counter!("aggregate_refresh_failures_total").increment(1);
            warn!("aggregate refresh timed out");
            return Err(AggregateError::TimedOut);
        }
    };

    let (goal_transactions, mut unit_balances) = build_aggregates(&transactions, &fund_codes);
    value_unit_balances(&mut unit_balances, &fund_codes, prices).await;
    store.swap(goal_transactions, unit_balances).await;

    let elapsed = started.elapsed();
    metrics::histogram!("aggregate_refresh_duration_seconds").record(elapsed.as_secs_f64());
    metrics::counter!("aggregate_refresh_success_total").increment(1);
    info!(transaction_count = transactions.len(), elapsed_ms = elapsed.as_millis() as u64, "aggregate refresh complete");

    Ok(())
}

pub fn build_aggregates(
    transactions: &[FundTransaction],
    fund_codes: &std::collections::HashMap<uuid::Uuid, model::FundCode>,
) -> (GoalTransactionsAggregate, AccountUnitBalancesAggregate) {
    let mut goal_transactions = GoalTransactionsAggregate::default();
    let mut unit_balances = AccountUnitBalancesAggregate::default();

    for tx in transactions {
        let Some(&fund_code) = fund_codes.get(&tx.fund_id) else {
            tracing::warn!(fund_id = %tx.fund_id, "fund transaction references an unknown fund id, skipping");
            continue;
        };

        let row = goal_transactions
            .rows
            .entry(tx.goal_transaction_code.clone())
            .or_insert_with(|| {
                let (_, account_number, goal_number) = model::code::parse(&tx.goal_transaction_code)
                    .unwrap_or_else(|_| (tx.transaction_date, tx.goal_transaction_code.clone(), tx.goal_transaction_code.clone()));
                GoalTransactionAggregateRow {
                    goal_transaction_code: tx.goal_transaction_code.clone(),
                    account_id: tx.account_id,
                    goal_id: tx.goal_id,
                    client_id: tx.client_id,
                    account_number,
                    goal_number,
                    transaction_id: tx.transaction_id.clone(),
                    transaction_date: tx.transaction_date,
                    transaction_type: tx.transaction_type,
                    total_amount: model::Money::zero(),
                    fund_count: 0,
                    deposit_count: 0,
                    withdrawal_count: 0,
                    legs: std::collections::HashMap::new(),
                }
            });
        row.total_amount = row.total_amount + tx.amount;
        row.fund_count += 1;
        match tx.transaction_type {
            model::TransactionType::Deposit => row.deposit_count += 1,
            model::TransactionType::Withdrawal | model::TransactionType::Redemption => row.withdrawal_count += 1,
        }
        let leg = row.legs.entry(fund_code).or_insert(FundLeg {
            amount: model::Money::zero(),
            units: model::Units::zero(),
        });
        leg.amount = leg.amount + tx.amount;
        leg.units = leg.units + tx.units;

        let account_row = unit_balances.rows.entry(tx.account_id).or_insert_with(|| AccountUnitBalanceRow {
            account_id: tx.account_id,
            client_id: tx.client_id,
            per_fund_units: std::collections::HashMap::new(),
            total_units: model::Units::zero(),
            last_transaction_date: tx.transaction_date,
            per_fund_value: std::collections::HashMap::new(),
            total_value: model::Money::zero(),
        });
        let fund_units = account_row.per_fund_units.entry(fund_code).or_insert(model::Units::zero());
        *fund_units = *fund_units + tx.units;
        account_row.total_units = account_row.total_units + tx.units;
        if tx.transaction_date > account_row.last_transaction_date {
            account_row.last_transaction_date = tx.transaction_date;
        }
    }

    (goal_transactions, unit_balances)
}

/// Prices every fund code appearing in `unit_balances` at most once
/// regardless of how many accounts hold it, then marks each account's
/// holdings at the fund's mid price.
async fn value_unit_balances(
    unit_balances: &mut AccountUnitBalancesAggregate,
    fund_codes: &std::collections::HashMap<uuid::Uuid, FundCode>,
    prices: &dyn PriceProvider,
) {
    let fund_id_by_code: std::collections::HashMap<FundCode, uuid::Uuid> =
        fund_codes.iter().map(|(&id, &code)| (code, id)).collect();

    let mut mid_by_code: std::collections::HashMap<FundCode, rust_decimal::Decimal> = std::collections::HashMap::new();
    for code in fund_codes.values().copied().collect::<std::collections::HashSet<_>>() {
        let Some(&fund_id) = fund_id_by_code.get(&code) else { continue };
        match prices.latest_price(fund_id).await {
            Ok(Some(price)) => {
                mid_by_code.insert(code, price.mid);
            }
            Ok(None) => {}
            Err(e) => warn!(fund_code = ?code, error = %e, "price lookup failed, leaving fund unvalued"),
        }
    }

    for row in unit_balances.rows.values_mut() {
        row.total_value = model::Money::zero();
        for (&code, &units) in &row.per_fund_units {
            let Some(&mid) = mid_by_code.get(&code) else { continue };
            let value = units.times_price(mid);
            row.per_fund_value.insert(code, value);
            row.total_value = row.total_value + value;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use model::{Money, TransactionSource as Source, TransactionType, Units};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn tx(account_id: Uuid, goal_id: Uuid, code: &str, amount: rust_decimal::Decimal, fund_id: Uuid) -> FundTransaction {
        FundTransaction {
            id: Uuid::new_v4(),
            fund_transaction_id: format!("{code}-leg"),
            goal_transaction_code: code.to_string(),
            transaction_id: "T1".to_string(),
            source: Source::Bank,
            client_id: Uuid::new_v4(),
            account_id,
            goal_id,
            fund_id,
            upload_batch_id: Uuid::new_v4(),
            transaction_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            date_created: Utc::now(),
            transaction_type: TransactionType::Deposit,
            amount: Money::new(amount),
            units: Units::new(amount),
            bid: dec!(12.40),
            mid: dec!(12.45),
            offer: dec!(12.50),
            price_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            row_number: 2,
        }
    }

    #[test]
    fn aggregates_sum_amounts_and_units_per_code_and_account() {
        let account_id = Uuid::new_v4();
        let goal_id = Uuid::new_v4();
        let fund_id = Uuid::new_v4();
        let transactions = vec![
            tx(account_id, goal_id, "2025-01-02|a|g", dec!(50), fund_id),
            tx(account_id, goal_id, "2025-01-02|a|g", dec!(25), fund_id),
        ];
        let mut fund_codes = std::collections::HashMap::new();
        fund_codes.insert(fund_id, model::FundCode::Xummf);
        let (goal_transactions, unit_balances) = build_aggregates(&transactions, &fund_codes);
        let row = &goal_transactions.rows["2025-01-02|a|g"];
        assert_eq!(row.total_amount.raw(), dec!(75));
        assert_eq!(row.fund_count, 2);
        assert_eq!(row.deposit_count, 2);
        assert_eq!(unit_balances.rows.len(), 1);
        assert_eq!(unit_balances.rows[&account_id].total_units.raw(), dec!(75));
    }

    #[test]
    fn withdrawal_decreases_total_units() {
        let account_id = Uuid::new_v4();
        let goal_id = Uuid::new_v4();
        let fund_id = Uuid::new_v4();
        let mut withdrawal = tx(account_id, goal_id, "2025-01-02|a|g2", dec!(30), fund_id);
        withdrawal.transaction_type = TransactionType::Withdrawal;
        withdrawal.amount = Money::new(dec!(-30));
        withdrawal.units = Units::new(dec!(-30));
        let transactions = vec![
            tx(account_id, goal_id, "2025-01-02|a|g", dec!(50), fund_id),
            withdrawal,
        ];
        let mut fund_codes = std::collections::HashMap::new();
        fund_codes.insert(fund_id, model::FundCode::Xummf);
        let (_, unit_balances) = build_aggregates(&transactions, &fund_codes);
        assert_eq!(unit_balances.rows[&account_id].total_units.raw(), dec!(20));
        assert_eq!(
            unit_balances.rows[&account_id].per_fund_units[&model::FundCode::Xummf].raw(),
            dec!(20)
        );
    }

    #[test]
    fn transaction_with_unknown_fund_id_is_skipped() {
        let account_id = Uuid::new_v4();
        let goal_id = Uuid::new_v4();
        let transactions = vec![tx(account_id, goal_id, "2025-01-02|a|g", dec!(50), Uuid::new_v4())];
        let (goal_transactions, _) = build_aggregates(&transactions, &std::collections::HashMap::new());
        assert!(goal_transactions.rows.is_empty());
    }

    struct FakeSource {
        transactions: Vec<FundTransaction>,
        fund_codes: std::collections::HashMap<Uuid, model::FundCode>,
    }

    #[async_trait::async_trait]
    impl TransactionSource for FakeSource {
        async fn all_fund_transactions(&self) -> Result<Vec<FundTransaction>, AggregateError> {
            Ok(self.transactions.clone())
        }
        async fn fund_codes_by_id(&self) -> Result<std::collections::HashMap<Uuid, model::FundCode>, AggregateError> {
            Ok(self.fund_codes.clone())
        }
    }

    #[tokio::test]
    async fn refresh_swaps_the_store_readers_see() {
        let store = AggregateStore::default();
        assert!(store.goal_transactions().await.rows.is_empty());

        let account_id = Uuid::new_v4();
        let goal_id = Uuid::new_v4();
        let fund_id = Uuid::new_v4();
        let mut fund_codes = std::collections::HashMap::new();
        fund_codes.insert(fund_id, model::FundCode::Xummf);
        let source = FakeSource {
            transactions: vec![tx(account_id, goal_id, "2025-01-02|a|g", dec!(50), fund_id)],
            fund_codes,
        };
        let prices = crate::price_cache::FixedPriceProvider::new();
        refresh(&store, &source, &prices, Duration::from_secs(5)).await.unwrap();

        assert_eq!(store.goal_transactions().await.rows.len(), 1);
    }

    #[tokio::test]
    async fn refresh_values_unit_balances_at_the_latest_price() {
        let store = AggregateStore::default();
        let account_id = Uuid::new_v4();
        let goal_id = Uuid::new_v4();
        let fund_id = Uuid::new_v4();
        let mut fund_codes = std::collections::HashMap::new();
        fund_codes.insert(fund_id, model::FundCode::Xummf);
        let source = FakeSource {
            transactions: vec![tx(account_id, goal_id, "2025-01-02|a|g", dec!(50), fund_id)],
            fund_codes,
        };
        let prices = crate::price_cache::FixedPriceProvider::new().seed(
            fund_id,
            model::FundPrice {
                fund_id,
                price_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                bid: dec!(1.90),
                mid: dec!(2.00),
                offer: dec!(2.10),
            },
        );
        refresh(&store, &source, &prices, Duration::from_secs(5)).await.unwrap();

        let unit_balances = store.unit_balances().await;
        let row = &unit_balances.rows[&account_id];
        assert_eq!(row.per_fund_value[&model::FundCode::Xummf].raw(), dec!(100));
        assert_eq!(row.total_value.raw(), dec!(100));
    }

    #[tokio::test]
    async fn fund_with_no_known_price_is_left_unvalued() {
        let account_id = Uuid::new_v4();
        let goal_id = Uuid::new_v4();
        let fund_id = Uuid::new_v4();
        let mut fund_codes = std::collections::HashMap::new();
        fund_codes.insert(fund_id, model::FundCode::Xummf);
        let transactions = vec![tx(account_id, goal_id, "2025-01-02|a|g", dec!(50), fund_id)];
        let (_, mut unit_balances) = build_aggregates(&transactions, &fund_codes);
        let prices = crate::price_cache::FixedPriceProvider::new();
        value_unit_balances(&mut unit_balances, &fund_codes, &prices).await;

        let row = &unit_balances.rows[&account_id];
        assert!(row.per_fund_value.is_empty());
        assert_eq!(row.total_value.raw(), dec!(0));
    }
}
