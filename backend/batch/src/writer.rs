//! Batch Writer (spec.md §4.G): resolves each validated row's foreign keys
//! against in-memory lookup maps, then writes `FundTransaction`s in fixed
//! size chunks, deduplicating on `(uploadBatchId, rowNumber)`.

use std::collections::{HashMap, HashSet};

use model::{Account, Client, FundTransaction, Goal, TransactionType};
use tracing::info;
use uuid::Uuid;
use validate::FundRow;

use crate::error::BatchError;

pub struct EntityLookup {
    pub clients_by_name: HashMap<String, Client>,
    pub accounts_by_number: HashMap<String, Account>,
    pub goals_by_key: HashMap<String, Goal>,
    pub funds_by_code: HashMap<model::FundCode, Uuid>,
}

/// Resolves every row's client/account/goal/fund foreign keys, producing
/// persistable `FundTransaction`s. A row whose entities are not (yet) in
/// `lookup` is skipped — the caller is expected to have run entity creation
/// first so this should only happen for rows awaiting approval.
pub fn resolve_transactions(
    rows: &[FundRow],
    upload_batch_id: Uuid,
    lookup: &EntityLookup,
) -> (Vec<FundTransaction>, Vec<u64>) {
    let mut resolved = Vec::with_capacity(rows.len());
    let mut unresolved_rows = Vec::new();

    for row in rows {
        let Some(client) = lookup.clients_by_name.get(&row.client_name) else {
            unresolved_rows.push(row.row_number);
            continue;
        };
        let Some(account) = lookup.accounts_by_number.get(&row.account_number) else {
            unresolved_rows.push(row.row_number);
            continue;
        };
        let goal_key = format!("{}|{}", row.account_number, row.goal_number);
        let Some(goal) = lookup.goals_by_key.get(&goal_key) else {
            unresolved_rows.push(row.row_number);
            continue;
        };
        let Some(fund_id) = lookup.funds_by_code.get(&row.fund_code) else {
            unresolved_rows.push(row.row_number);
            continue;
        };
        let Ok(goal_transaction_code) = row.goal_transaction_code() else {
            unresolved_rows.push(row.row_number);
            continue;
        };

        resolved.push(FundTransaction {
            id: Uuid::new_v4(),
            fund_transaction_id: format!("{}-{}", goal_transaction_code, row.fund_code.as_str()),
            goal_transaction_code,
            transaction_id: row.transaction_id.clone(),
            source: row.source,
            client_id: client.id,
            account_id: account.id,
            goal_id: goal.id,
            fund_id: *fund_id,
            upload_batch_id,
            transaction_date: row.transaction_date,
            date_created: row.date_created,
            transaction_type: row.transaction_type,
            amount: signed_amount(row.amount, row.transaction_type),
            units: signed_units(row.units, row.transaction_type),
            bid: row.bid,
            mid: row.mid,
            offer: row.offer,
            price_date: row.transaction_date,
            row_number: row.row_number,
        });
    }

    (resolved, unresolved_rows)
}

fn signed_amount(amount: model::Money, transaction_type: TransactionType) -> model::Money {
    match transaction_type {
        TransactionType::Deposit => amount.abs(),
        TransactionType::Withdrawal | TransactionType::Redemption => {
            model::Money::new(-amount.abs().raw())
        }
    }
}

fn signed_units(units: model::Units, transaction_type: TransactionType) -> model::Units {
    match transaction_type {
        TransactionType::Deposit => units.abs(),
        TransactionType::Withdrawal | TransactionType::Redemption => {
            model::Units::new(-units.abs().raw())
        }
    }
}

/// Splits `transactions` into fixed-size chunks for bulk insert, dropping
/// any transaction whose `(uploadBatchId, rowNumber)` was already written
/// (idempotent replay of a partially-written batch).
pub fn chunk_for_write<'a>(
    transactions: &'a [FundTransaction],
    chunk_size: usize,
    already_written: &HashSet<(Uuid, u64)>,
) -> Vec<&'a [FundTransaction]> {
    let fresh: Vec<&FundTransaction> = transactions
        .iter()
        .filter(|t| !already_written.contains(&(t.upload_batch_id, t.row_number)))
        .collect();

    // chunk_size applies to the filtered set; `chunks` needs owned slices,
    // so index back into the original contiguous regions is unnecessary
    // here since we only need read-only chunked batches for INSERT calls.
    let mut out = Vec::new();
    let mut start = 0;
    while start < fresh.len() {
        let end = (start + chunk_size).min(fresh.len());
        out.push(&fresh[start..end]);
        start = end;
    }
    out
}

#[async_trait::async_trait]
pub trait BatchWriteRepository: Send + Sync {
    async fn already_written_keys(&self, upload_batch_id: Uuid) -> Result<HashSet<(Uuid, u64)>, BatchError>;
    async fn insert_chunk(&self, chunk: &[FundTransaction]) -> Result<(), BatchError>;
}

/// Writes every resolved transaction in chunks inside the caller's
/// transaction boundary; an error on any chunk must roll back the whole
/// batch (all-or-nothing, spec.md §4.G).
pub async fn write_all(
    repo: &dyn BatchWriteRepository,
    transactions: &[FundTransaction],
    upload_batch_id: Uuid,
    chunk_size: usize,
) -> Result<usize, BatchError> {
    let already_written = repo.already_written_keys(upload_batch_id).await?;
    let chunks = chunk_for_write(transactions, chunk_size, &already_written);
    let chunk_count = chunks.len();
    let mut written = 0;
    for chunk in chunks {
        repo.insert_chunk(chunk).await?;
        written += chunk.len();
    }
    info!(%upload_batch_id, written, chunk_count, skipped = already_written.len(), "batch write complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use model::{AccountCategory, AccountType, FundCode, TransactionSource};
    use rust_decimal_macros::dec;

    fn row(row_number: u64) -> FundRow {
        FundRow {
            row_number,
            transaction_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            client_name: "Jane Doe".to_string(),
            fund_code: FundCode::Xummf,
            amount: model::Money::new(dec!(100)),
            units: model::Units::new(dec!(8)),
            transaction_type: TransactionType::Withdrawal,
            bid: dec!(12.40),
            mid: dec!(12.45),
            offer: dec!(12.50),
            date_created: Utc::now(),
            goal_title: "Goal".to_string(),
            goal_number: "g1".to_string(),
            account_number: "701-807".to_string(),
            account_type: AccountType::Personal,
            account_category: AccountCategory::General,
            transaction_id: "T1".to_string(),
            source: TransactionSource::Bank,
            sponsor_code: None,
        }
    }

    fn lookup() -> EntityLookup {
        let client = Client { id: Uuid::new_v4(), name: "Jane Doe".to_string(), status: model::ClientStatus::Active };
        let account = Account {
            id: Uuid::new_v4(), client_id: client.id, account_number: "701-807".to_string(),
            account_type: model::AccountType::Personal, category: model::AccountCategory::General,
            sponsor_code: None, status: model::AccountStatus::Active, opened_at: Utc::now(),
        };
        let goal = Goal {
            id: Uuid::new_v4(), account_id: account.id, goal_number: "g1".to_string(),
            title: "Goal".to_string(), goal_type: model::GoalType::Other, risk_tolerance: model::RiskTolerance::Moderate,
            fund_distribution: HashMap::new(), status: model::GoalStatus::Active,
        };
        let mut clients_by_name = HashMap::new();
        clients_by_name.insert(client.name.clone(), client);
        let mut accounts_by_number = HashMap::new();
        accounts_by_number.insert(account.account_number.clone(), account);
        let mut goals_by_key = HashMap::new();
        goals_by_key.insert("701-807|g1".to_string(), goal);
        let mut funds_by_code = HashMap::new();
        funds_by_code.insert(FundCode::Xummf, Uuid::new_v4());

        EntityLookup { clients_by_name, accounts_by_number, goals_by_key, funds_by_code }
    }

    #[test]
    fn withdrawal_amount_is_signed_negative() {
        let (resolved, unresolved) = resolve_transactions(&[row(2)], Uuid::new_v4(), &lookup());
        assert!(unresolved.is_empty());
        assert!(resolved[0].amount.is_negative());
    }

    #[test]
    fn withdrawal_units_is_signed_negative() {
        let (resolved, unresolved) = resolve_transactions(&[row(2)], Uuid::new_v4(), &lookup());
        assert!(unresolved.is_empty());
        assert!(resolved[0].units.is_negative());
        assert_eq!(resolved[0].units.raw(), dec!(-8));
    }

    #[test]
    fn deposit_units_is_signed_positive() {
        let mut deposit_row = row(2);
        deposit_row.transaction_type = TransactionType::Deposit;
        let (resolved, unresolved) = resolve_transactions(&[deposit_row], Uuid::new_v4(), &lookup());
        assert!(unresolved.is_empty());
        assert!(!resolved[0].units.is_negative());
        assert_eq!(resolved[0].units.raw(), dec!(8));
    }

    #[test]
    fn row_with_unresolvable_account_is_skipped() {
        let mut l = lookup();
        l.accounts_by_number.clear();
        let (resolved, unresolved) = resolve_transactions(&[row(2)], Uuid::new_v4(), &l);
        assert!(resolved.is_empty());
        assert_eq!(unresolved, vec![2]);
    }

    #[test]
    fn chunking_respects_chunk_size_and_dedup() {
        let batch_id = Uuid::new_v4();
        let (resolved, _) = resolve_transactions(&[row(2), row(3), row(4)], batch_id, &lookup());
        let mut already = HashSet::new();
        already.insert((batch_id, 3u64));
        let chunks = chunk_for_write(&resolved, 1, &already);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0][0].row_number, 2);
        assert_eq!(chunks[1][0].row_number, 4);
    }
}
