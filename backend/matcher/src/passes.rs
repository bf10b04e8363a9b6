//! The three matching passes (spec.md §4.L): exact transaction-id match,
//! greedy amount-within-window match, and same-day split matches in both
//! directions. Each pass is a pure function over slices — no input
//! mutation, a `MatchRecord` list plus the leftover unmatched ids is the
//! only output (spec.md §9: "emit a plan, then apply").

use std::collections::HashSet;

use model::{BankGoalTransaction, Config, MatcherConfig};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::types::FundGoalTxn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Amount,
    SplitBankToFund,
    SplitFundToBank,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Exact => "exact",
            MatchKind::Amount => "amount",
            MatchKind::SplitBankToFund => "split_bank_to_fund",
            MatchKind::SplitFundToBank => "split_fund_to_bank",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecord {
    pub kind: MatchKind,
    pub bank_ids: Vec<Uuid>,
    pub fund_codes: Vec<String>,
    pub confidence: f64,
}

/// `τ(x) = max(0.01·|x|, floor)`, configurable (spec.md §9's Open Question
/// resolution).
pub fn tolerance(amount: Decimal, config: &MatcherConfig) -> Decimal {
    (config.tolerance_percent * amount.abs()).max(config.tolerance_floor)
}

#[derive(Default)]
pub struct PassState {
    pub consumed_bank: HashSet<Uuid>,
    pub consumed_fund: HashSet<String>,
}

/// Pass 1: exact match on `transactionId` within tolerance of the total
/// amount. Confidence 1.0 always.
pub fn pass_exact(
    bank: &[BankGoalTransaction],
    fund: &[FundGoalTxn],
    config: &MatcherConfig,
    state: &mut PassState,
) -> Vec<MatchRecord> {
    let mut bank_order: Vec<&BankGoalTransaction> = bank.iter().collect();
    bank_order.sort_by_key(|b| b.id);
    let mut fund_order: Vec<&FundGoalTxn> = fund.iter().collect();
    fund_order.sort_by(|a, b| a.goal_transaction_code.cmp(&b.goal_transaction_code));

    let mut matches = Vec::new();
    for b in &bank_order {
        if state.consumed_bank.contains(&b.id) {
            continue;
        }
        for f in &fund_order {
            if state.consumed_fund.contains(&f.goal_transaction_code) {
                continue;
            }
            if b.transaction_id != f.transaction_id {
                continue;
            }
            let diff = (b.total_amount.raw() - f.total_amount.raw()).abs();
            if diff > tolerance(f.total_amount.raw(), config) {
                continue;
            }
            state.consumed_bank.insert(b.id);
            state.consumed_fund.insert(f.goal_transaction_code.clone());
            matches.push(MatchRecord {
                kind: MatchKind::Exact,
                bank_ids: vec![b.id],
                fund_codes: vec![f.goal_transaction_code.clone()],
                confidence: 1.0,
            });
            break;
        }
    }
    matches
}

/// Pass 2: sorts remaining bank/fund rows by date then amount, generates
/// every candidate pair within the date window respecting `type`, then
/// assigns greedily by (date diff, amount diff, bank id) — the tie-break
/// spec.md §4.L names explicitly, for determinism.
pub fn pass_amount_window(
    bank: &[BankGoalTransaction],
    fund: &[FundGoalTxn],
    config: &MatcherConfig,
    state: &mut PassState,
) -> Vec<MatchRecord> {
    let bank_rows: Vec<&BankGoalTransaction> = bank.iter().filter(|b| !state.consumed_bank.contains(&b.id)).collect();
    let fund_rows: Vec<&FundGoalTxn> = fund.iter().filter(|f| !state.consumed_fund.contains(&f.goal_transaction_code)).collect();

    struct Candidate {
        bi: usize,
        fi: usize,
        date_diff: i64,
        amount_diff: Decimal,
        bank_id: Uuid,
    }

    let mut candidates = Vec::new();
    for (bi, b) in bank_rows.iter().enumerate() {
        for (fi, f) in fund_rows.iter().enumerate() {
            if b.transaction_type != f.transaction_type {
                continue;
            }
            let date_diff = (b.transaction_date - f.transaction_date).num_days().abs();
            if date_diff > config.date_window_days {
                continue;
            }
            let amount_diff = (b.total_amount.raw() - f.total_amount.raw()).abs();
            if amount_diff > tolerance(f.total_amount.raw(), config) {
                continue;
            }
            candidates.push(Candidate { bi, fi, date_diff, amount_diff, bank_id: b.id });
        }
    }

    candidates.sort_by(|a, b| {
        a.date_diff
            .cmp(&b.date_diff)
            .then(a.amount_diff.cmp(&b.amount_diff))
            .then(a.bank_id.cmp(&b.bank_id))
    });

    let mut used_bank = HashSet::new();
    let mut used_fund = HashSet::new();
    let mut matches = Vec::new();
    for c in candidates {
        if used_bank.contains(&c.bi) || used_fund.contains(&c.fi) {
            continue;
        }
        used_bank.insert(c.bi);
        used_fund.insert(c.fi);
        let b = bank_rows[c.bi];
        let f = fund_rows[c.fi];
        let tau = tolerance(f.total_amount.raw(), config);
        let confidence = amount_window_confidence(c.date_diff, c.amount_diff, tau, config.date_window_days);
        state.consumed_bank.insert(b.id);
        state.consumed_fund.insert(f.goal_transaction_code.clone());
        matches.push(MatchRecord {
            kind: MatchKind::Amount,
            bank_ids: vec![b.id],
            fund_codes: vec![f.goal_transaction_code.clone()],
            confidence,
        });
    }
    matches
}

fn amount_window_confidence(date_diff_days: i64, amount_diff: Decimal, tau: Decimal, window_days: i64) -> f64 {
    let date_term = (date_diff_days as f64 / window_days.max(1) as f64).min(1.0) * 0.3;
    let amount_term = if tau.is_zero() {
        0.0
    } else {
        (amount_diff / tau).min(Decimal::ONE).to_string().parse::<f64>().unwrap_or(1.0) * 0.2
    };
    (1.0 - date_term - amount_term).clamp(0.0, 1.0)
}

/// Pass 3: same-day split matches, in both directions, subset size capped
/// at `config.split_max_legs` (spec.md §4.L).
pub fn pass_splits(
    bank: &[BankGoalTransaction],
    fund: &[FundGoalTxn],
    config: &MatcherConfig,
    state: &mut PassState,
) -> Vec<MatchRecord> {
    let mut bank_rows: Vec<&BankGoalTransaction> = bank.iter().filter(|b| !state.consumed_bank.contains(&b.id)).collect();
    bank_rows.sort_by_key(|b| b.id);
    let mut fund_rows: Vec<&FundGoalTxn> = fund.iter().filter(|f| !state.consumed_fund.contains(&f.goal_transaction_code)).collect();
    fund_rows.sort_by(|a, b| a.goal_transaction_code.cmp(&b.goal_transaction_code));

    let mut dates: Vec<chrono::NaiveDate> = bank_rows
        .iter()
        .map(|b| b.transaction_date)
        .chain(fund_rows.iter().map(|f| f.transaction_date))
        .collect();
    dates.sort();
    dates.dedup();

    let mut used_bank: HashSet<usize> = HashSet::new();
    let mut used_fund: HashSet<usize> = HashSet::new();
    let mut matches = Vec::new();

    for date in dates {
        let day_bank: Vec<usize> = bank_rows.iter().enumerate().filter(|(i, b)| b.transaction_date == date && !used_bank.contains(i)).map(|(i, _)| i).collect();
        let day_fund: Vec<usize> = fund_rows.iter().enumerate().filter(|(i, f)| f.transaction_date == date && !used_fund.contains(i)).map(|(i, _)| i).collect();

        for &fi in &day_fund {
            if used_fund.contains(&fi) {
                continue;
            }
            let avail: Vec<usize> = day_bank.iter().copied().filter(|i| !used_bank.contains(i)).collect();
            let target = fund_rows[fi].total_amount.raw();
            if let Some(subset) = find_subset_sum(&avail, &bank_rows, |b| b.total_amount.raw(), target, config) {
                for &bi in &subset {
                    used_bank.insert(bi);
                }
                used_fund.insert(fi);
                let confidence = split_confidence(subset.len());
                matches.push(MatchRecord {
                    kind: MatchKind::SplitBankToFund,
                    bank_ids: subset.iter().map(|&i| bank_rows[i].id).collect(),
                    fund_codes: vec![fund_rows[fi].goal_transaction_code.clone()],
                    confidence,
                });
            }
        }

        for &bi in &day_bank {
            if used_bank.contains(&bi) {
                continue;
            }
            let avail: Vec<usize> = day_fund.iter().copied().filter(|i| !used_fund.contains(i)).collect();
            let target = bank_rows[bi].total_amount.raw();
            if let Some(subset) = find_subset_sum(&avail, &fund_rows, |f| f.total_amount.raw(), target, config) {
                for &fi in &subset {
                    used_fund.insert(fi);
                }
                used_bank.insert(bi);
                let confidence = split_confidence(subset.len());
                matches.push(MatchRecord {
                    kind: MatchKind::SplitFundToBank,
                    bank_ids: vec![bank_rows[bi].id],
                    fund_codes: subset.iter().map(|&i| fund_rows[i].goal_transaction_code.clone()).collect(),
                    confidence,
                });
            }
        }
    }

    for (idx, b) in bank_rows.iter().enumerate() {
        if used_bank.contains(&idx) {
            state.consumed_bank.insert(b.id);
        }
    }
    for (idx, f) in fund_rows.iter().enumerate() {
        if used_fund.contains(&idx) {
            state.consumed_fund.insert(f.goal_transaction_code.clone());
        }
    }

    matches
}

fn split_confidence(leg_count: usize) -> f64 {
    let extra = leg_count.saturating_sub(2) as f64;
    (0.9 - 0.05 * extra).max(0.0)
}

/// Enumerates subsets of `avail` (sizes 2..=`split_max_legs`, smallest
/// first) looking for one whose amounts sum to `target` within tolerance.
/// Groups needing more than `split_max_legs` legs are left unmatched
/// (spec.md §4.L, §8's boundary property).
fn find_subset_sum<T, F>(avail: &[usize], items: &[&T], amount_of: F, target: Decimal, config: &MatcherConfig) -> Option<Vec<usize>>
where
    F: Fn(&T) -> Decimal,
{
    let tau = (config.tolerance_percent * target.abs()).max(config.tolerance_floor);
    let max_size = config.split_max_legs.min(avail.len());
    for size in 2..=max_size {
        for combo in combinations(avail, size) {
            let sum: Decimal = combo.iter().map(|&i| amount_of(items[i])).sum();
            if (sum - target).abs() <= tau {
                return Some(combo);
            }
        }
    }
    None
}

fn combinations(items: &[usize], k: usize) -> Vec<Vec<usize>> {
    if k == 0 {
        return vec![Vec::new()];
    }
    if items.len() < k {
        return Vec::new();
    }
    let mut out = Vec::new();
    for i in 0..=(items.len() - k) {
        let first = items[i];
        for mut rest in combinations(&items[i + 1..], k - 1) {
            rest.insert(0, first);
            out.push(rest);
        }
    }
    out
}

/// Runs all three passes in order against one goal's bank/fund rows,
/// returning every match plus the leftover unmatched ids/codes.
pub fn run_passes(bank: &[BankGoalTransaction], fund: &[FundGoalTxn], config: &Config) -> (Vec<MatchRecord>, Vec<Uuid>, Vec<String>) {
    let mut state = PassState::default();
    let mut matches = pass_exact(bank, fund, &config.matcher, &mut state);
    matches.extend(pass_amount_window(bank, fund, &config.matcher, &mut state));
    matches.extend(pass_splits(bank, fund, &config.matcher, &mut state));

    let unmatched_bank: Vec<Uuid> = bank.iter().filter(|b| !state.consumed_bank.contains(&b.id)).map(|b| b.id).collect();
    let unmatched_fund: Vec<String> = fund
        .iter()
        .filter(|f| !state.consumed_fund.contains(&f.goal_transaction_code))
        .map(|f| f.goal_transaction_code.clone())
        .collect();

    (matches, unmatched_bank, unmatched_fund)
}
