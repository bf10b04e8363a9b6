//! Aggregate refresher and price cache (spec.md §4.J).

pub mod error;
pub mod pg;
pub mod price_cache;
pub mod refresher;
pub mod types;

pub use error::AggregateError;
pub use pg::{PgPriceProvider, PgTransactionSource};
pub use price_cache::{CachedPriceProvider, FixedPriceProvider, PriceProvider};
pub use refresher::{build_aggregates, refresh, AggregateStore, TransactionSource};
pub use types::{AccountUnitBalanceRow, AccountUnitBalancesAggregate, FundLeg, GoalTransactionAggregateRow, GoalTransactionsAggregate};
