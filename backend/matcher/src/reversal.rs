//! Reversal netting (spec.md §4.L): bank-to-bank only. A deposit and a
//! same-goal, same-magnitude withdrawal left unmatched after the three
//! passes are almost always a correction on the bank side — netted out
//! and excluded from variance generation rather than reported as two
//! separate `missing_in_fund_system` variances.

use std::collections::HashSet;

use model::BankGoalTransaction;
use uuid::Uuid;

/// Pairs unmatched bank rows of equal magnitude and opposite
/// `transactionType`. Deterministic: candidates are sorted by id before
/// pairing, so re-running over the same unmatched set always nets the
/// same pairs.
pub fn net_reversals(bank: &[BankGoalTransaction], unmatched_ids: &[Uuid]) -> Vec<(Uuid, Uuid)> {
    let by_id: std::collections::HashMap<Uuid, &BankGoalTransaction> = bank.iter().map(|b| (b.id, b)).collect();
    let mut remaining: Vec<Uuid> = unmatched_ids.to_vec();
    remaining.sort();

    let mut paired = HashSet::new();
    let mut pairs = Vec::new();
    for &id in &remaining {
        if paired.contains(&id) {
            continue;
        }
        let Some(&txn) = by_id.get(&id) else { continue };
        for &other_id in &remaining {
            if other_id == id || paired.contains(&other_id) {
                continue;
            }
            let Some(&other) = by_id.get(&other_id) else { continue };
            if txn.transaction_type == other.transaction_type {
                continue;
            }
            if txn.total_amount.raw() == other.total_amount.raw() {
                pairs.push((id, other_id));
                paired.insert(id);
                paired.insert(other_id);
                break;
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use model::{Money, ReconciliationStatus, TransactionType};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn bank(id: Uuid, amount: rust_decimal::Decimal, transaction_type: TransactionType) -> BankGoalTransaction {
        BankGoalTransaction {
            id,
            bank_upload_batch_id: Uuid::new_v4(),
            transaction_id: "X".to_string(),
            goal_number: "g1".to_string(),
            account_number: "701-807".to_string(),
            client_name: "Jane Doe".to_string(),
            transaction_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            transaction_type,
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

    #[test]
    fn nets_opposite_type_same_magnitude_pair() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let bank_rows = vec![
            bank(a, dec!(50_000), TransactionType::Deposit),
            bank(b, dec!(50_000), TransactionType::Withdrawal),
        ];
        let pairs = net_reversals(&bank_rows, &[a, b]);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0] == (a, b) || pairs[0] == (b, a));
    }

    #[test]
    fn does_not_net_same_type_or_different_magnitude() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let bank_rows = vec![
            bank(a, dec!(50_000), TransactionType::Deposit),
            bank(b, dec!(50_000), TransactionType::Deposit),
            bank(c, dec!(40_000), TransactionType::Withdrawal),
        ];
        let pairs = net_reversals(&bank_rows, &[a, b, c]);
        assert!(pairs.is_empty());
    }
}
