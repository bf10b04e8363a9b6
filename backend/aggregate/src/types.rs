//! The two materialized aggregates spec.md §4.J refreshes from
//! `FundTransaction`s: one row per goal-transaction code, one row per
//! account/fund unit balance.

use std::collections::HashMap;

use chrono::NaiveDate;
use model::{FundCode, Money, TransactionType, Units};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct FundLeg {
    pub amount: Money,
    pub units: Units,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GoalTransactionAggregateRow {
    pub goal_transaction_code: String,
    pub account_id: Uuid,
    pub goal_id: Uuid,
    pub client_id: Uuid,
    /// Parsed straight out of `goal_transaction_code` (spec.md §4.A) rather
    /// than joined, so the refresher needs no client/account/goal lookup
    /// beyond the fund-id map it already takes.
    pub account_number: String,
    pub goal_number: String,
    pub transaction_id: String,
    pub transaction_date: NaiveDate,
    pub transaction_type: TransactionType,
    pub total_amount: Money,
    pub fund_count: u32,
    pub deposit_count: u32,
    pub withdrawal_count: u32,
    pub legs: HashMap<FundCode, FundLeg>,
}

#[derive(Debug, Clone, Default)]
pub struct GoalTransactionsAggregate {
    pub rows: HashMap<String, GoalTransactionAggregateRow>,
}

/// One row per account (spec.md §4.J's `AccountUnitBalancesAggregate`):
/// per-fund unit balances plus the totals and last-activity date a reader
/// needs without also consulting `GoalTransactionsAggregate`.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountUnitBalanceRow {
    pub account_id: Uuid,
    pub client_id: Uuid,
    pub per_fund_units: HashMap<FundCode, Units>,
    pub total_units: Units,
    pub last_transaction_date: NaiveDate,
    /// Mark-to-market value of `per_fund_units` at the latest known price
    /// per fund (supplemented feature, spec.md §9). Absent a price for a
    /// fund a row holds units in, that fund is simply left out of both maps
    /// rather than valued at zero.
    pub per_fund_value: HashMap<FundCode, Money>,
    pub total_value: Money,
}

#[derive(Debug, Clone, Default)]
pub struct AccountUnitBalancesAggregate {
    pub rows: HashMap<Uuid, AccountUnitBalanceRow>,
}
