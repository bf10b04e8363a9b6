//! The fund-side half of a match: a virtual `GoalTransaction` derived by
//! grouping `FundTransaction` legs sharing one `goalTransactionCode`
//! (spec.md §3, §4.L). The bank-side half is `model::BankGoalTransaction`
//! as written by the bank pipeline — no separate type needed there.

use std::collections::HashMap;

use chrono::NaiveDate;
use model::{FundCode, FundTransaction, Money, TransactionType};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct FundGoalTxn {
    pub goal_transaction_code: String,
    pub account_number: String,
    pub goal_number: String,
    pub transaction_date: NaiveDate,
    pub transaction_type: TransactionType,
    pub transaction_id: String,
    /// Magnitude of the group's total (legs are signed by direction in
    /// storage; matching compares against the bank's unsigned amount).
    pub total_amount: Money,
    pub fund_amounts: HashMap<FundCode, Money>,
}

impl FundGoalTxn {
    fn from_legs(legs: &[FundTransaction], fund_codes: &HashMap<Uuid, FundCode>) -> Option<Self> {
        let first = legs.first()?;
        let (_, account_number, goal_number) = model::code::parse(&first.goal_transaction_code).ok()?;
        let mut fund_amounts: HashMap<FundCode, Money> = HashMap::new();
        for leg in legs {
            let Some(&fund_code) = fund_codes.get(&leg.fund_id) else {
                continue;
            };
            let entry = fund_amounts.entry(fund_code).or_insert(Money::zero());
            *entry = *entry + leg.amount.abs();
        }
        let total_amount = legs.iter().fold(Money::zero(), |acc, t| acc + t.amount.abs());
        Some(Self {
            goal_transaction_code: first.goal_transaction_code.clone(),
            account_number,
            goal_number,
            transaction_date: first.transaction_date,
            transaction_type: first.transaction_type,
            transaction_id: first.transaction_id.clone(),
            total_amount,
            fund_amounts,
        })
    }

    /// Groups a flat set of fund-transaction legs (e.g. all legs for one
    /// goal in the matcher's date window) into one row per code.
    pub fn group_all(transactions: Vec<FundTransaction>, fund_codes: &HashMap<Uuid, FundCode>) -> Vec<Self> {
        model::group_by_code(transactions, |t| t.goal_transaction_code.clone())
            .into_iter()
            .filter_map(|(_, legs)| Self::from_legs(&legs, fund_codes))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::{Money, TransactionSource as Source, Units};
    use rust_decimal_macros::dec;

    fn leg(code: &str, fund_id: Uuid, amount: rust_decimal::Decimal, transaction_type: TransactionType) -> FundTransaction {
        FundTransaction {
            id: Uuid::new_v4(),
            fund_transaction_id: format!("{code}-leg"),
            goal_transaction_code: code.to_string(),
            transaction_id: "T1".to_string(),
            source: Source::Bank,
            client_id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            goal_id: Uuid::new_v4(),
            fund_id,
            upload_batch_id: Uuid::new_v4(),
            transaction_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            date_created: Utc::now(),
            transaction_type,
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
    fn groups_legs_by_code_and_sums_magnitudes() {
        let fund_id = Uuid::new_v4();
        let mut fund_codes = HashMap::new();
        fund_codes.insert(fund_id, FundCode::Xummf);
        let legs = vec![
            leg("2025-01-02|701-807|g1", fund_id, dec!(100), TransactionType::Withdrawal),
            leg("2025-01-02|701-807|g1", fund_id, dec!(50), TransactionType::Withdrawal),
        ];
        let grouped = FundGoalTxn::group_all(legs, &fund_codes);
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped[0].total_amount.raw(), dec!(150));
        assert_eq!(grouped[0].goal_number, "g1");
        assert_eq!(grouped[0].account_number, "701-807");
    }

    #[test]
    fn leg_with_unknown_fund_id_is_excluded_from_fund_amounts_but_still_counted() {
        let legs = vec![leg("2025-01-02|701-807|g1", Uuid::new_v4(), dec!(100), TransactionType::Deposit)];
        let grouped = FundGoalTxn::group_all(legs, &HashMap::new());
        assert_eq!(grouped[0].total_amount.raw(), dec!(100));
        assert!(grouped[0].fund_amounts.is_empty());
    }
}
