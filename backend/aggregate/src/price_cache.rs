//! Price-provider interface with TTL cache (spec.md §9's "latest-prices
//! cache"): a fund's latest [`FundPrice`] changes at most once a day but is
//! consulted on every aggregate refresh's valuation pass, so it is
//! encapsulated behind [`PriceProvider`] and memoized with a TTL rather than
//! queried straight off the database each time.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use model::FundPrice;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AggregateError;

/// Looks up a fund's latest price by its surrogate id. Implemented by
/// [`crate::pg::PgPriceProvider`] in production and [`FixedPriceProvider`]
/// in tests, per spec.md §9 ("so tests can substitute a fixed-price
/// oracle").
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn latest_price(&self, fund_id: Uuid) -> Result<Option<FundPrice>, AggregateError>;
}

struct Entry {
    price: FundPrice,
    fetched_at: Instant,
}

/// Wraps any [`PriceProvider`] with a TTL memoization (default 1 hour,
/// spec.md §9), explicitly invalidated after every aggregate refresh rather
/// than waiting out the TTL.
pub struct CachedPriceProvider<P: PriceProvider> {
    inner: P,
    ttl: Duration,
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl<P: PriceProvider> CachedPriceProvider<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self { inner, ttl, entries: RwLock::new(HashMap::new()) }
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }
}

#[async_trait]
impl<P: PriceProvider> PriceProvider for CachedPriceProvider<P> {
    async fn latest_price(&self, fund_id: Uuid) -> Result<Option<FundPrice>, AggregateError> {
        if let Some(entry) = self.entries.read().await.get(&fund_id) {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(Some(entry.price.clone()));
            }
        }

        let fetched = self.inner.latest_price(fund_id).await?;
        if let Some(price) = &fetched {
            self.entries.write().await.insert(fund_id, Entry { price: price.clone(), fetched_at: Instant::now() });
        }
        Ok(fetched)
    }
}

/// Fixed-price test double: never hits a database, returns whatever was
/// seeded for a fund id (or `None`).
#[derive(Default)]
pub struct FixedPriceProvider {
    prices: HashMap<Uuid, FundPrice>,
}

impl FixedPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(mut self, fund_id: Uuid, price: FundPrice) -> Self {
        self.prices.insert(fund_id, price);
        self
    }
}

#[async_trait]
impl PriceProvider for FixedPriceProvider {
    async fn latest_price(&self, fund_id: Uuid) -> Result<Option<FundPrice>, AggregateError> {
        Ok(self.prices.get(&fund_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn sample_price() -> FundPrice {
        FundPrice {
            fund_id: Uuid::new_v4(),
            price_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            bid: dec!(12.40),
            mid: dec!(12.45),
            offer: dec!(12.50),
        }
    }

    struct CountingProvider {
        price: FundPrice,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl PriceProvider for CountingProvider {
        async fn latest_price(&self, _fund_id: Uuid) -> Result<Option<FundPrice>, AggregateError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Some(self.price.clone()))
        }
    }

    #[tokio::test]
    async fn cached_provider_serves_repeat_lookups_from_cache() {
        let price = sample_price();
        let fund_id = price.fund_id;
        let inner = CountingProvider { price, calls: std::sync::atomic::AtomicUsize::new(0) };
        let cached = CachedPriceProvider::new(inner, Duration::from_secs(60));

        cached.latest_price(fund_id).await.unwrap();
        cached.latest_price(fund_id).await.unwrap();

        assert_eq!(cached.inner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_refetches() {
        let price = sample_price();
        let fund_id = price.fund_id;
        let inner = CountingProvider { price, calls: std::sync::atomic::AtomicUsize::new(0) };
        let cached = CachedPriceProvider::new(inner, Duration::from_millis(1));

        cached.latest_price(fund_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cached.latest_price(fund_id).await.unwrap();

        assert_eq!(cached.inner.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn invalidate_all_forces_refetch() {
        let price = sample_price();
        let fund_id = price.fund_id;
        let inner = CountingProvider { price, calls: std::sync::atomic::AtomicUsize::new(0) };
        let cached = CachedPriceProvider::new(inner, Duration::from_secs(60));

        cached.latest_price(fund_id).await.unwrap();
        cached.invalidate_all().await;
        cached.latest_price(fund_id).await.unwrap();

        assert_eq!(cached.inner.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fixed_provider_returns_none_for_unseeded_fund() {
        let provider = FixedPriceProvider::new();
        assert!(provider.latest_price(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fixed_provider_returns_seeded_price() {
        let price = sample_price();
        let fund_id = price.fund_id;
        let provider = FixedPriceProvider::new().seed(fund_id, price.clone());
        let looked_up = provider.latest_price(fund_id).await.unwrap().unwrap();
        assert_eq!(looked_up.offer, price.offer);
    }
}
