//! Group Validator (spec.md §4.D): per-goal-transaction-code invariants
//! across the (up to four) fund legs sharing one code.

use model::{Config, ErrorSeverity, FundCode, Goal, RowError, TransactionType};
use std::collections::HashSet;

use crate::row::FundRow;

fn critical(row_number: u64, code: &str, message: impl Into<String>) -> RowError {
    RowError {
        row_number,
        field: None,
        error_code: code.to_string(),
        severity: ErrorSeverity::Critical,
        message: message.into(),
        suggested_action: None,
        value: None,
    }
}

fn warning(row_number: u64, code: &str, message: impl Into<String>) -> RowError {
    RowError {
        row_number,
        field: None,
        error_code: code.to_string(),
        severity: ErrorSeverity::Warning,
        message: message.into(),
        suggested_action: None,
        value: None,
    }
}

/// Validates one goal-transaction group (all fund rows sharing a
/// goalTransactionCode). `existing_goal` is the already-persisted goal
/// matching this group's account/goal number, if one exists yet — used to
/// cross-check `fundDistribution`.
pub fn validate_group(
    code: &str,
    rows: &[FundRow],
    existing_goal: Option<&Goal>,
    config: &Config,
) -> Vec<RowError> {
    let mut errors = Vec::new();
    let first_row_number = rows.first().map(|r| r.row_number).unwrap_or(0);

    let distinct_client_names: HashSet<&str> =
        rows.iter().map(|r| r.client_name.as_str()).collect();
    if distinct_client_names.len() > 1 {
        errors.push(critical(
            first_row_number,
            "GOAL_TRANSACTION_SAME_CLIENT",
            format!("goal transaction {code} carries {} distinct client names", distinct_client_names.len()),
        ));
    }

    let distinct_account_numbers: HashSet<&str> =
        rows.iter().map(|r| r.account_number.as_str()).collect();
    if distinct_account_numbers.len() > 1 {
        errors.push(critical(
            first_row_number,
            "GOAL_TRANSACTION_SAME_ACCOUNT",
            format!("goal transaction {code} carries {} distinct account numbers", distinct_account_numbers.len()),
        ));
    }

    let distinct_goal_numbers: HashSet<&str> =
        rows.iter().map(|r| r.goal_number.as_str()).collect();
    if distinct_goal_numbers.len() > 1 {
        errors.push(critical(
            first_row_number,
            "GOAL_TRANSACTION_SAME_GOAL",
            format!("goal transaction {code} carries {} distinct goal numbers", distinct_goal_numbers.len()),
        ));
    }

    let distinct_dates: HashSet<_> = rows.iter().map(|r| r.transaction_date).collect();
    if distinct_dates.len() > 1 {
        errors.push(critical(
            first_row_number,
            "GOAL_TRANSACTION_SAME_DATE",
            format!("goal transaction {code} carries {} distinct transaction dates", distinct_dates.len()),
        ));
    }

    let distinct_transaction_ids: HashSet<&str> =
        rows.iter().map(|r| r.transaction_id.as_str()).collect();
    if distinct_transaction_ids.len() > 1 {
        errors.push(critical(
            first_row_number,
            "GOAL_TRANSACTION_SAME_TRANSACTION_ID",
            format!("goal transaction {code} carries {} distinct transaction ids", distinct_transaction_ids.len()),
        ));
    }

    let distinct_sources: HashSet<_> = rows.iter().map(|r| r.source).collect();
    if distinct_sources.len() > 1 {
        errors.push(critical(
            first_row_number,
            "GOAL_TRANSACTION_SAME_SOURCE",
            format!("goal transaction {code} carries {} distinct sources", distinct_sources.len()),
        ));
    }

    let distinct_types: HashSet<_> = rows.iter().map(|r| r.transaction_type).collect();
    if distinct_types.len() > 1 {
        errors.push(critical(
            first_row_number,
            "GOAL_TRANSACTION_MIXED_TYPE",
            format!("goal transaction {code} mixes transaction types within one group"),
        ));
    }

    let distinct_fund_codes: HashSet<_> = rows.iter().map(|r| r.fund_code).collect();
    if rows.len() != FundCode::ALL.len() {
        errors.push(warning(
            first_row_number,
            "GOAL_TRANSACTION_GROUP_SIZE",
            format!("goal transaction {code} has {} legs, expected {}", rows.len(), FundCode::ALL.len()),
        ));
    }
    if distinct_fund_codes.len() < rows.len() {
        errors.push(warning(
            first_row_number,
            "GOAL_TRANSACTION_DUPLICATE_FUND_CODE",
            format!("goal transaction {code} repeats a fund code across legs"),
        ));
    }

    let total_amount: rust_decimal::Decimal = rows.iter().map(|r| r.amount.raw()).sum();
    if total_amount.is_zero() {
        errors.push(warning(
            first_row_number,
            "GOAL_TRANSACTION_ZERO_AMOUNT",
            format!("goal transaction {code} sums to a zero total amount"),
        ));
    }

    if let (Some(goal), false) = (existing_goal, total_amount.is_zero()) {
        if let Some(distribution_error) =
            check_fund_distribution(code, rows, goal, total_amount, config)
        {
            errors.push(distribution_error);
        }
    }

    errors
}

fn check_fund_distribution(
    code: &str,
    rows: &[FundRow],
    goal: &Goal,
    total_amount: rust_decimal::Decimal,
    config: &Config,
) -> Option<RowError> {
    let first_row_number = rows.first().map(|r| r.row_number).unwrap_or(0);
    let tolerance = config.validation.distribution_tolerance_fraction;

    for fund_code in FundCode::ALL {
        let expected_fraction = goal
            .fund_distribution
            .get(&fund_code)
            .map(|p| p.value())
            .unwrap_or(rust_decimal::Decimal::ZERO);
        let actual_amount: rust_decimal::Decimal = rows
            .iter()
            .filter(|r| r.fund_code == fund_code)
            .map(|r| r.amount.raw())
            .sum();
        let actual_fraction = actual_amount / total_amount;
        if (actual_fraction - expected_fraction).abs() > tolerance {
            return Some(warning(
                first_row_number,
                "GOAL_TRANSACTION_DISTRIBUTION_MISMATCH",
                format!(
                    "goal transaction {code} fund {} allocates {actual_fraction:.4} of total, goal's fundDistribution expects {expected_fraction:.4}",
                    fund_code.as_str()
                ),
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use model::{AccountCategory, AccountType, GoalStatus, GoalType, Percent, RiskTolerance, TransactionSource};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn make_row(fund_code: FundCode, amount: rust_decimal::Decimal, transaction_id: &str) -> FundRow {
        FundRow {
            row_number: 2,
            transaction_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            client_name: "Jane Doe".to_string(),
            fund_code,
            amount: model::Money::new(amount),
            units: model::Units::new(amount),
            transaction_type: TransactionType::Deposit,
            bid: dec!(12.40),
            mid: dec!(12.45),
            offer: dec!(12.50),
            date_created: Utc::now(),
            goal_title: "School Fees".to_string(),
            goal_number: "701-8076522785a".to_string(),
            account_number: "701-807".to_string(),
            account_type: AccountType::Personal,
            account_category: AccountCategory::General,
            transaction_id: transaction_id.to_string(),
            source: TransactionSource::Bank,
            sponsor_code: None,
        }
    }

    #[test]
    fn consistent_four_leg_group_has_no_errors() {
        let rows = vec![
            make_row(FundCode::Xummf, dec!(100), "T1"),
            make_row(FundCode::Xubf, dec!(100), "T1"),
            make_row(FundCode::Xudef, dec!(100), "T1"),
            make_row(FundCode::Xuref, dec!(100), "T1"),
        ];
        let errors = validate_group("2025-01-02|701-807|701-8076522785a", &rows, None, &Config::default());
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn mismatched_transaction_id_is_critical() {
        let rows = vec![
            make_row(FundCode::Xummf, dec!(100), "T1"),
            make_row(FundCode::Xubf, dec!(100), "T2"),
        ];
        let errors = validate_group("2025-01-02|701-807|701-8076522785a", &rows, None, &Config::default());
        assert!(errors.iter().any(|e| e.error_code == "GOAL_TRANSACTION_SAME_TRANSACTION_ID"
            && e.severity == ErrorSeverity::Critical));
    }

    #[test]
    fn group_size_other_than_four_is_a_warning() {
        let rows = vec![make_row(FundCode::Xummf, dec!(100), "T1")];
        let errors = validate_group("2025-01-02|701-807|701-8076522785a", &rows, None, &Config::default());
        assert!(errors.iter().any(|e| e.error_code == "GOAL_TRANSACTION_GROUP_SIZE"
            && e.severity == ErrorSeverity::Warning));
    }

    #[test]
    fn mixed_transaction_type_is_critical() {
        let mut withdrawal = make_row(FundCode::Xubf, dec!(100), "T1");
        withdrawal.transaction_type = TransactionType::Withdrawal;
        let rows = vec![make_row(FundCode::Xummf, dec!(100), "T1"), withdrawal];
        let errors = validate_group("2025-01-02|701-807|701-8076522785a", &rows, None, &Config::default());
        assert!(errors.iter().any(|e| e.error_code == "GOAL_TRANSACTION_MIXED_TYPE"));
    }

    #[test]
    fn distribution_mismatch_against_existing_goal_is_a_warning() {
        let mut distribution = HashMap::new();
        distribution.insert(FundCode::Xummf, Percent::from_fraction(dec!(0.80)));
        distribution.insert(FundCode::Xubf, Percent::from_fraction(dec!(0.20)));
        let goal = Goal {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            goal_number: "701-8076522785a".to_string(),
            title: "School Fees".to_string(),
            goal_type: GoalType::Education,
            risk_tolerance: RiskTolerance::Moderate,
            fund_distribution: distribution,
            status: GoalStatus::Active,
        };
        let rows = vec![
            make_row(FundCode::Xummf, dec!(50), "T1"),
            make_row(FundCode::Xubf, dec!(50), "T1"),
        ];
        let errors = validate_group("2025-01-02|701-807|701-8076522785a", &rows, Some(&goal), &Config::default());
        assert!(errors.iter().any(|e| e.error_code == "GOAL_TRANSACTION_DISTRIBUTION_MISMATCH"));
    }

    #[test]
    fn zero_total_amount_skips_distribution_check() {
        let mut distribution = HashMap::new();
        distribution.insert(FundCode::Xummf, Percent::from_fraction(dec!(1.0)));
        let goal = Goal {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            goal_number: "701-8076522785a".to_string(),
            title: "School Fees".to_string(),
            goal_type: GoalType::Education,
            risk_tolerance: RiskTolerance::Moderate,
            fund_distribution: distribution,
            status: GoalStatus::Active,
        };
        let rows = vec![
            make_row(FundCode::Xummf, dec!(50), "T1"),
            make_row(FundCode::Xubf, dec!(-50), "T1"),
        ];
        let errors = validate_group("2025-01-02|701-807|701-8076522785a", &rows, Some(&goal), &Config::default());
        assert!(!errors.iter().any(|e| e.error_code == "GOAL_TRANSACTION_DISTRIBUTION_MISMATCH"));
    }
}
