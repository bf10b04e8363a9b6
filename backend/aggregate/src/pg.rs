//! Postgres-backed [`TransactionSource`], raw `sqlx::query`/`query_as` (no
//! compile-time `query!` macro — there is no live database at build time).

use std::collections::HashMap;

use model::{FundCode, FundPrice, FundTransaction, Money, TransactionSource as TxnSource, TransactionType, Units};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::AggregateError;
use crate::price_cache::PriceProvider;
use crate::refresher::TransactionSource;

pub struct PgTransactionSource {
    pool: PgPool,
}

impl PgTransactionSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TransactionSource for PgTransactionSource {
    async fn all_fund_transactions(&self) -> Result<Vec<FundTransaction>, AggregateError> {
        let rows = sqlx::query(
            "SELECT id, fund_transaction_id, goal_transaction_code, transaction_id, source, client_id, \
                    account_id, goal_id, fund_id, upload_batch_id, transaction_date, date_created, \
                    transaction_type, amount, units, bid, mid, offer, price_date, row_number \
             FROM fund_transactions",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(row_to_fund_transaction).collect())
    }

    async fn fund_codes_by_id(&self) -> Result<HashMap<Uuid, FundCode>, AggregateError> {
        let rows = sqlx::query("SELECT id, fund_code FROM funds").fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .filter_map(|r| {
                let id: Uuid = r.get("id");
                let raw: String = r.get("fund_code");
                FundCode::parse(&raw).map(|code| (id, code))
            })
            .collect())
    }
}

/// Real [`PriceProvider`]: the most recent `fund_prices` row per fund, by
/// `price_date`. Callers wrap this in [`crate::price_cache::CachedPriceProvider`]
/// rather than hitting it on every lookup.
pub struct PgPriceProvider {
    pool: PgPool,
}

impl PgPriceProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PriceProvider for PgPriceProvider {
    async fn latest_price(&self, fund_id: Uuid) -> Result<Option<FundPrice>, AggregateError> {
        let row = sqlx::query(
            "SELECT fund_id, price_date, bid, mid, offer FROM fund_prices \
             WHERE fund_id = $1 ORDER BY price_date DESC LIMIT 1",
        )
        .bind(fund_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| FundPrice {
            fund_id: r.get("fund_id"),
            price_date: r.get("price_date"),
            bid: r.get("bid"),
            mid: r.get("mid"),
            offer: r.get("offer"),
        }))
    }
}

fn row_to_fund_transaction(row: sqlx::postgres::PgRow) -> FundTransaction {
    FundTransaction {
        id: row.get("id"),
        fund_transaction_id: row.get("fund_transaction_id"),
        goal_transaction_code: row.get("goal_transaction_code"),
        transaction_id: row.get("transaction_id"),
        source: parse_transaction_source(row.get("source")),
        client_id: row.get("client_id"),
        account_id: row.get("account_id"),
        goal_id: row.get("goal_id"),
        fund_id: row.get("fund_id"),
        upload_batch_id: row.get("upload_batch_id"),
        transaction_date: row.get("transaction_date"),
        date_created: row.get("date_created"),
        transaction_type: parse_transaction_type(row.get("transaction_type")),
        amount: Money::new(row.get("amount")),
        units: Units::new(row.get("units")),
        bid: row.get("bid"),
        mid: row.get("mid"),
        offer: row.get("offer"),
        price_date: row.get("price_date"),
        row_number: row.get::<i64, _>("row_number") as u64,
    }
}

fn parse_transaction_type(raw: String) -> TransactionType {
    match raw.as_str() {
        "withdrawal" => TransactionType::Withdrawal,
        "redemption" => TransactionType::Redemption,
        _ => TransactionType::Deposit,
    }
}

fn parse_transaction_source(raw: String) -> TxnSource {
    match raw.as_str() {
        "mobile" => TxnSource::Mobile,
        "web" => TxnSource::Web,
        "ussd" => TxnSource::UssD,
        "branch_cash" => TxnSource::BranchCash,
        "standing_order" => TxnSource::StandingOrder,
        _ => TxnSource::Bank,
    }
}
