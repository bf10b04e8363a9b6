//! Best-effort linking of a validated bank row to the client/account/goal
//! master tables (spec.md §4.K). A row with no match on file still
//! produces a `BankGoalTransaction`, tagged `missing_in_fund` so the
//! matcher can flag it rather than silently drop it.

use model::{BankGoalTransaction, Goal, ReconciliationStatus};
use tracing::debug;
use uuid::Uuid;

use crate::row::BankRow;

pub struct MasterLookup<'a> {
    pub account_ids_by_number: &'a std::collections::HashMap<String, Uuid>,
    pub goals_by_key: &'a std::collections::HashMap<String, Goal>,
}

pub fn link_row(bank_upload_batch_id: Uuid, row: &BankRow, lookup: &MasterLookup) -> BankGoalTransaction {
    let goal_key = format!("{}|{}", row.account_number, row.goal_number);
    let matched = lookup.account_ids_by_number.contains_key(&row.account_number)
        && lookup.goals_by_key.contains_key(&goal_key);
    if !matched {
        debug!(row_number = row.row_number, account_number = %row.account_number, goal_number = %row.goal_number, "bank row missing in fund master tables");
    }

    BankGoalTransaction {
        id: Uuid::new_v4(),
        bank_upload_batch_id,
        transaction_id: row.transaction_id.clone(),
        goal_number: row.goal_number.clone(),
        account_number: row.account_number.clone(),
        client_name: row.client_name.clone(),
        transaction_date: row.transaction_date,
        transaction_type: row.transaction_type,
        total_amount: row.total_amount,
        fund_percentages: row.fund_percentages.clone(),
        fund_amounts: row.fund_amounts.clone(),
        reconciliation_status: if matched {
            ReconciliationStatus::Unmatched
        } else {
            ReconciliationStatus::MissingInFund
        },
        matched_goal_transaction_code: None,
        matching_score: None,
        review_tag: None,
        row_number: row.row_number,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use model::{FundCode, GoalStatus, GoalType, Money, Percent, RiskTolerance, TransactionType};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn sample_row() -> BankRow {
        let mut fund_percentages = HashMap::new();
        fund_percentages.insert(FundCode::Xummf, Percent::from_fraction(dec!(1.0)));
        let mut fund_amounts = HashMap::new();
        fund_amounts.insert(FundCode::Xummf, Money::new(dec!(100)));
        BankRow {
            row_number: 2,
            transaction_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            transaction_id: "T1".to_string(),
            goal_number: "g1".to_string(),
            account_number: "701-807".to_string(),
            client_name: "Jane Doe".to_string(),
            transaction_type: TransactionType::Deposit,
            total_amount: Money::new(dec!(100)),
            fund_percentages,
            fund_amounts,
        }
    }

    #[test]
    fn unmatched_account_is_tagged_missing_in_fund() {
        let accounts = HashMap::new();
        let goals = HashMap::new();
        let lookup = MasterLookup { account_ids_by_number: &accounts, goals_by_key: &goals };
        let linked = link_row(Uuid::new_v4(), &sample_row(), &lookup);
        assert_eq!(linked.reconciliation_status, ReconciliationStatus::MissingInFund);
    }

    #[test]
    fn matched_account_and_goal_is_unmatched_pending_the_matcher() {
        let mut accounts = HashMap::new();
        accounts.insert("701-807".to_string(), Uuid::new_v4());
        let mut goals = HashMap::new();
        goals.insert("701-807|g1".to_string(), Goal {
            id: Uuid::new_v4(), account_id: Uuid::new_v4(), goal_number: "g1".to_string(),
            title: "Goal".to_string(), goal_type: GoalType::Other, risk_tolerance: RiskTolerance::Moderate,
            fund_distribution: HashMap::new(), status: GoalStatus::Active,
        });
        let lookup = MasterLookup { account_ids_by_number: &accounts, goals_by_key: &goals };
        let linked = link_row(Uuid::new_v4(), &sample_row(), &lookup);
        assert_eq!(linked.reconciliation_status, ReconciliationStatus::Unmatched);
    }
}
