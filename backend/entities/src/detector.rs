//! Entity Detector (spec.md §4.E): diffs a batch's valid rows against the
//! master tables and summarizes what would need to be created.

use model::{FundCode, Percent};
use std::collections::{HashMap, HashSet};
use tracing::info;
use validate::FundRow;

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NewEntitySummary {
    pub key: String,
    pub transaction_count: u64,
    pub total_amount: model::Money,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct NewEntitiesReport {
    pub new_clients: Vec<NewEntitySummary>,
    pub new_accounts: Vec<NewEntitySummary>,
    pub new_goals: Vec<NewGoalSummary>,
}

impl NewEntitiesReport {
    pub fn is_empty(&self) -> bool {
        self.new_clients.is_empty() && self.new_accounts.is_empty() && self.new_goals.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NewGoalSummary {
    pub key: String,
    pub transaction_count: u64,
    pub total_amount: model::Money,
    pub fund_distribution: HashMap<FundCode, Percent>,
}

/// Known entity keys already on file, so the detector can tell new from
/// existing. Client/account keys are their natural identifiers; goal keys
/// are `accountNumber|goalNumber`.
#[derive(Debug, Clone, Default)]
pub struct KnownEntities {
    pub client_names: HashSet<String>,
    pub account_numbers: HashSet<String>,
    pub goal_keys: HashSet<String>,
}

pub fn detect_new_entities(rows: &[FundRow], known: &KnownEntities) -> NewEntitiesReport {
    let report = NewEntitiesReport {
        new_clients: summarize_new(rows, &known.client_names, |r| r.client_name.clone()),
        new_accounts: summarize_new(rows, &known.account_numbers, |r| r.account_number.clone()),
        new_goals: summarize_new_goals(rows, &known.goal_keys),
    };
    if !report.is_empty() {
        info!(
            new_clients = report.new_clients.len(),
            new_accounts = report.new_accounts.len(),
            new_goals = report.new_goals.len(),
            "new entities detected"
        );
    }
    report
}

fn summarize_new<F>(rows: &[FundRow], known: &HashSet<String>, key_of: F) -> Vec<NewEntitySummary>
where
    F: Fn(&FundRow) -> String,
{
    let mut by_key: HashMap<String, (u64, model::Money)> = HashMap::new();
    for row in rows {
        let key = key_of(row);
        if known.contains(&key) {
            continue;
        }
        let entry = by_key.entry(key).or_insert((0, model::Money::zero()));
        entry.0 += 1;
        entry.1 = entry.1 + row.amount;
    }
    let mut out: Vec<NewEntitySummary> = by_key
        .into_iter()
        .map(|(key, (count, total))| NewEntitySummary {
            key,
            transaction_count: count,
            total_amount: total,
        })
        .collect();
    out.sort_by(|a, b| a.key.cmp(&b.key));
    out
}

fn summarize_new_goals(rows: &[FundRow], known_goal_keys: &HashSet<String>) -> Vec<NewGoalSummary> {
    let mut by_key: HashMap<String, (u64, model::Money, HashMap<FundCode, model::Money>)> = HashMap::new();
    for row in rows {
        let key = format!("{}|{}", row.account_number, row.goal_number);
        if known_goal_keys.contains(&key) {
            continue;
        }
        let entry = by_key.entry(key).or_insert_with(|| (0, model::Money::zero(), HashMap::new()));
        entry.0 += 1;
        entry.1 = entry.1 + row.amount;
        let fund_entry = entry.2.entry(row.fund_code).or_insert_with(model::Money::zero);
        *fund_entry = *fund_entry + row.amount;
    }

    let mut out: Vec<NewGoalSummary> = by_key
        .into_iter()
        .map(|(key, (count, total, per_fund))| NewGoalSummary {
            key,
            transaction_count: count,
            total_amount: total,
            fund_distribution: fund_distribution_for(&per_fund, total),
        })
        .collect();
    out.sort_by(|a, b| a.key.cmp(&b.key));
    out
}

/// Distribution mode for a new goal: proportional to observed per-fund
/// amounts, or an equal split across legs actually seen when the total is
/// zero (net-zero reversal batches still need a distribution to persist).
fn fund_distribution_for(
    per_fund: &HashMap<FundCode, model::Money>,
    total: model::Money,
) -> HashMap<FundCode, Percent> {
    if total.is_zero() || total.raw().is_zero() {
        let legs = per_fund.len().max(1) as i64;
        let equal_share = rust_decimal::Decimal::ONE / rust_decimal::Decimal::from(legs);
        return per_fund
            .keys()
            .map(|code| (*code, Percent::from_fraction(equal_share)))
            .collect();
    }
    per_fund
        .iter()
        .map(|(code, amount)| (*code, Percent::from_fraction(amount.raw() / total.raw())))
        .collect()
}
