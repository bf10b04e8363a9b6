//! The Variance Store (spec.md §4.M): turns a goal's match outcome into
//! `ReconciliationVariance` rows, with severity graded off
//! `MatcherConfig`'s thresholds and auto-approval for goals whose only
//! variances are low-severity.

use std::collections::{HashMap, HashSet};

use model::{BankGoalTransaction, FundCode, MatcherConfig, Money, ReconciliationVariance, ResolutionStatus, VarianceSeverity, VarianceType};
use uuid::Uuid;

use crate::passes::{MatchKind, MatchRecord};
use crate::types::FundGoalTxn;

fn severity_for_amount(delta: rust_decimal::Decimal, config: &MatcherConfig) -> VarianceSeverity {
    let delta = delta.abs();
    if delta < config.severity_low_ceiling {
        VarianceSeverity::Low
    } else if delta < config.severity_medium_ceiling {
        VarianceSeverity::Medium
    } else if delta < config.severity_high_ceiling {
        VarianceSeverity::High
    } else {
        VarianceSeverity::Critical
    }
}

fn new_variance(bank_id: Uuid, fund_code: Option<String>, variance_type: VarianceType, severity: VarianceSeverity) -> ReconciliationVariance {
    ReconciliationVariance {
        id: Uuid::new_v4(),
        bank_goal_transaction_id: bank_id,
        fund_goal_transaction_code: fund_code,
        variance_type,
        severity,
        amount_delta: None,
        date_delta_days: None,
        fund_code: None,
        fund_delta: None,
        resolution_status: ResolutionStatus::Open,
        auto_approved: false,
        reviewer: None,
        notes: None,
    }
}

/// Builds the variance rows for every matched pair and every row left
/// unmatched after reversal netting. `reversal_netted` bank ids are
/// excluded entirely — spec.md §4.L says a netted pair settles, it never
/// becomes a variance.
pub fn generate(
    matches: &[MatchRecord],
    unmatched_bank: &[Uuid],
    reversal_netted: &HashSet<Uuid>,
    bank_by_id: &HashMap<Uuid, BankGoalTransaction>,
    fund_by_code: &HashMap<String, FundGoalTxn>,
    config: &MatcherConfig,
) -> Vec<ReconciliationVariance> {
    let mut variances = Vec::new();

    for m in matches {
        variances.extend(variances_for_match(m, bank_by_id, fund_by_code, config));
    }

    for bank_id in unmatched_bank {
        if reversal_netted.contains(bank_id) {
            continue;
        }
        variances.push(new_variance(*bank_id, None, VarianceType::MissingInFundSystem, VarianceSeverity::High));
    }

    variances
}

fn variances_for_match(
    m: &MatchRecord,
    bank_by_id: &HashMap<Uuid, BankGoalTransaction>,
    fund_by_code: &HashMap<String, FundGoalTxn>,
    config: &MatcherConfig,
) -> Vec<ReconciliationVariance> {
    let mut out = Vec::new();
    let bank_rows: Vec<&BankGoalTransaction> = m.bank_ids.iter().filter_map(|id| bank_by_id.get(id)).collect();
    let fund_rows: Vec<&FundGoalTxn> = m.fund_codes.iter().filter_map(|c| fund_by_code.get(c)).collect();
    if bank_rows.is_empty() || fund_rows.is_empty() {
        return out;
    }

    let bank_total: rust_decimal::Decimal = bank_rows.iter().map(|b| b.total_amount.raw()).sum();
    let fund_total: rust_decimal::Decimal = fund_rows.iter().map(|f| f.total_amount.raw()).sum();
    let amount_delta = bank_total - fund_total;
    let tau = (config.tolerance_percent * fund_total.abs()).max(config.tolerance_floor);

    let primary_bank_id = bank_rows[0].id;
    let primary_fund_code = fund_rows[0].goal_transaction_code.clone();

    if amount_delta.abs() > tau {
        let mut v = new_variance(primary_bank_id, Some(primary_fund_code.clone()), VarianceType::TotalAmountMismatch, severity_for_amount(amount_delta, config));
        v.amount_delta = Some(Money::new(amount_delta));
        out.push(v);
    }

    let date_delta = (bank_rows[0].transaction_date - fund_rows[0].transaction_date).num_days();
    if date_delta.abs() > config.date_mismatch_threshold_days {
        let mut v = new_variance(primary_bank_id, Some(primary_fund_code.clone()), VarianceType::DateMismatch, VarianceSeverity::Low);
        v.date_delta_days = Some(date_delta);
        out.push(v);
    }

    if matches!(m.kind, MatchKind::Exact | MatchKind::Amount) {
        let bank_fund_amounts = &bank_rows[0].fund_amounts;
        let fund_fund_amounts = &fund_rows[0].fund_amounts;
        let mut codes: Vec<FundCode> = bank_fund_amounts.keys().chain(fund_fund_amounts.keys()).copied().collect();
        codes.sort_by_key(|c| c.as_str());
        codes.dedup();
        for code in codes {
            let bank_amount = bank_fund_amounts.get(&code).copied().unwrap_or(Money::zero()).raw();
            let fund_amount = fund_fund_amounts.get(&code).copied().unwrap_or(Money::zero()).raw();
            if fund_amount.is_zero() {
                continue;
            }
            let delta = bank_amount - fund_amount;
            let ratio = delta.abs() / fund_amount.abs();
            if ratio > config.tolerance_percent {
                let mut v = new_variance(primary_bank_id, Some(primary_fund_code.clone()), VarianceType::FundDistributionMismatch, VarianceSeverity::Medium);
                v.fund_code = Some(code);
                v.fund_delta = Some(Money::new(delta));
                out.push(v);
            }
        }
    }

    out
}

/// A pair auto-approves when every variance raised for it is low severity
/// and none is a medium-or-worse amount mismatch (spec.md §4.M).
pub fn auto_approve(variances: &mut [ReconciliationVariance]) -> bool {
    let eligible = variances.iter().all(|v| v.severity == VarianceSeverity::Low);
    if eligible {
        for v in variances.iter_mut() {
            v.auto_approved = true;
            v.resolution_status = ResolutionStatus::AutoApproved;
        }
    }
    eligible
}

/// Runs [`auto_approve`] per matched pair rather than once over the whole
/// goal: spec.md §4.M scopes auto-approval to a pair, so one bad pair must
/// not withhold auto-approval from an otherwise clean pair on the same
/// goal. Groups by `bank_goal_transaction_id`, which every variance for a
/// matched pair shares (the pair's "primary" bank row).
pub fn auto_approve_per_pair(variances: &mut [ReconciliationVariance]) {
    variances.sort_by_key(|v| v.bank_goal_transaction_id);
    let mut start = 0;
    while start < variances.len() {
        let key = variances[start].bank_goal_transaction_id;
        let mut end = start + 1;
        while end < variances.len() && variances[end].bank_goal_transaction_id == key {
            end += 1;
        }
        auto_approve(&mut variances[start..end]);
        start = end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use model::{ReconciliationStatus, TransactionType};
    use rust_decimal_macros::dec;

    fn bank(id: Uuid, amount: rust_decimal::Decimal, date: &str) -> BankGoalTransaction {
        BankGoalTransaction {
            id,
            bank_upload_batch_id: Uuid::new_v4(),
            transaction_id: "T1".to_string(),
            goal_number: "g1".to_string(),
            account_number: "701-807".to_string(),
            client_name: "Jane Doe".to_string(),
            transaction_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            transaction_type: TransactionType::Deposit,
            total_amount: Money::new(amount),
            fund_percentages: HashMap::new(),
            fund_amounts: HashMap::new(),
            reconciliation_status: ReconciliationStatus::Unmatched,
            matched_goal_transaction_code: None,
            matching_score: None,
            review_tag: None,
            row_number: 2,
        }
    }

    fn fund(code: &str, amount: rust_decimal::Decimal, date: &str) -> FundGoalTxn {
        FundGoalTxn {
            goal_transaction_code: code.to_string(),
            account_number: "701-807".to_string(),
            goal_number: "g1".to_string(),
            transaction_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            transaction_type: TransactionType::Deposit,
            transaction_id: "T1".to_string(),
            total_amount: Money::new(amount),
            fund_amounts: HashMap::new(),
        }
    }

    #[test]
    fn unmatched_bank_rows_become_high_severity_missing_variances() {
        let id = Uuid::new_v4();
        let variances = generate(&[], &[id], &HashSet::new(), &HashMap::new(), &HashMap::new(), &MatcherConfig::default());
        assert_eq!(variances.len(), 1);
        assert_eq!(variances[0].variance_type, VarianceType::MissingInFundSystem);
        assert_eq!(variances[0].severity, VarianceSeverity::High);
    }

    #[test]
    fn reversal_netted_rows_produce_no_variance() {
        let id = Uuid::new_v4();
        let mut netted = HashSet::new();
        netted.insert(id);
        let variances = generate(&[], &[id], &netted, &HashMap::new(), &HashMap::new(), &MatcherConfig::default());
        assert!(variances.is_empty());
    }

    #[test]
    fn large_amount_mismatch_is_critical_and_blocks_auto_approval() {
        let bank_id = Uuid::new_v4();
        let b = bank(bank_id, dec!(200_000), "2025-05-01");
        let f = fund("2025-05-01|a|g1", dec!(100_000), "2025-05-01");
        let mut bank_by_id = HashMap::new();
        bank_by_id.insert(bank_id, b);
        let mut fund_by_code = HashMap::new();
        fund_by_code.insert("2025-05-01|a|g1".to_string(), f);

        let m = MatchRecord {
            kind: MatchKind::Exact,
            bank_ids: vec![bank_id],
            fund_codes: vec!["2025-05-01|a|g1".to_string()],
            confidence: 1.0,
        };
        let mut variances = generate(&[m], &[], &HashSet::new(), &bank_by_id, &fund_by_code, &MatcherConfig::default());
        assert_eq!(variances.len(), 1);
        assert_eq!(variances[0].severity, VarianceSeverity::Critical);
        assert!(!auto_approve(&mut variances));
    }

    #[test]
    fn matched_pair_within_tolerance_has_no_variances_and_auto_approves() {
        let bank_id = Uuid::new_v4();
        let b = bank(bank_id, dec!(100_000), "2025-05-01");
        let f = fund("2025-05-01|a|g1", dec!(100_000), "2025-05-01");
        let mut bank_by_id = HashMap::new();
        bank_by_id.insert(bank_id, b);
        let mut fund_by_code = HashMap::new();
        fund_by_code.insert("2025-05-01|a|g1".to_string(), f);

        let m = MatchRecord {
            kind: MatchKind::Exact,
            bank_ids: vec![bank_id],
            fund_codes: vec!["2025-05-01|a|g1".to_string()],
            confidence: 1.0,
        };
        let mut variances = generate(&[m], &[], &HashSet::new(), &bank_by_id, &fund_by_code, &MatcherConfig::default());
        assert!(variances.is_empty());
        assert!(auto_approve(&mut variances));
    }

    #[test]
    fn date_mismatch_past_threshold_is_low_severity() {
        let bank_id = Uuid::new_v4();
        let b = bank(bank_id, dec!(100_000), "2025-05-10");
        let f = fund("2025-05-01|a|g1", dec!(100_000), "2025-05-01");
        let mut bank_by_id = HashMap::new();
        bank_by_id.insert(bank_id, b);
        let mut fund_by_code = HashMap::new();
        fund_by_code.insert("2025-05-01|a|g1".to_string(), f);

        let m = MatchRecord {
            kind: MatchKind::Amount,
            bank_ids: vec![bank_id],
            fund_codes: vec!["2025-05-01|a|g1".to_string()],
            confidence: 0.5,
        };
        let mut variances = generate(&[m], &[], &HashSet::new(), &bank_by_id, &fund_by_code, &MatcherConfig::default());
        assert_eq!(variances.len(), 1);
        assert_eq!(variances[0].variance_type, VarianceType::DateMismatch);
        assert_eq!(variances[0].severity, VarianceSeverity::Low);
        assert!(auto_approve(&mut variances));
    }

    #[test]
    fn auto_approve_per_pair_does_not_let_one_bad_pair_block_a_clean_pair() {
        let clean_bank_id = Uuid::new_v4();
        let clean_bank = bank(clean_bank_id, dec!(100_000), "2025-05-10");
        let clean_fund = fund("2025-05-01|a|g1", dec!(100_000), "2025-05-01");

        let bad_bank_id = Uuid::new_v4();
        let bad_bank = bank(bad_bank_id, dec!(200_000), "2025-06-01");
        let bad_fund = fund("2025-06-01|a|g1", dec!(100_000), "2025-06-01");

        let mut bank_by_id = HashMap::new();
        bank_by_id.insert(clean_bank_id, clean_bank);
        bank_by_id.insert(bad_bank_id, bad_bank);
        let mut fund_by_code = HashMap::new();
        fund_by_code.insert("2025-05-01|a|g1".to_string(), clean_fund);
        fund_by_code.insert("2025-06-01|a|g1".to_string(), bad_fund);

        let clean_match = MatchRecord {
            kind: MatchKind::Amount,
            bank_ids: vec![clean_bank_id],
            fund_codes: vec!["2025-05-01|a|g1".to_string()],
            confidence: 0.5,
        };
        let bad_match = MatchRecord {
            kind: MatchKind::Exact,
            bank_ids: vec![bad_bank_id],
            fund_codes: vec!["2025-06-01|a|g1".to_string()],
            confidence: 1.0,
        };

        let mut variances = generate(
            &[clean_match, bad_match],
            &[],
            &HashSet::new(),
            &bank_by_id,
            &fund_by_code,
            &MatcherConfig::default(),
        );
        assert_eq!(variances.len(), 2);

        auto_approve_per_pair(&mut variances);

        let clean = variances.iter().find(|v| v.bank_goal_transaction_id == clean_bank_id).unwrap();
        let bad = variances.iter().find(|v| v.bank_goal_transaction_id == bad_bank_id).unwrap();
        assert!(clean.auto_approved, "clean pair must auto-approve regardless of the other pair's severity");
        assert!(!bad.auto_approved);
    }
}
