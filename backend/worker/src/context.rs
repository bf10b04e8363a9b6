//! Process-wide shared state: the connection pool, every Pg-backed
//! repository, and the two long-lived in-memory stores (spec.md §4.J's
//! aggregates, §4.J's supplemented price cache). Built once in `main` and
//! handed to job handlers and operator operations as `Arc<AppContext>`.

use std::sync::Arc;
use std::time::Duration;

use aggregate::{AggregateStore, CachedPriceProvider, PgPriceProvider, PgTransactionSource};
use bank::PgBankRepository;
use entities::PgEntityRepository;
use matcher::PgMatchDataSource;
use model::Config;
use queue::PgQueueRepository;
use sqlx::PgPool;

use crate::repo::WorkerFundRepo;

pub struct AppContext {
    pub config: Config,
    pub pool: PgPool,
    pub fund_repo: WorkerFundRepo,
    pub entity_repo: PgEntityRepository,
    pub batch_repo: batch::PgBatchRepository,
    pub bank_repo: PgBankRepository,
    pub queue_repo: Arc<PgQueueRepository>,
    pub match_source: PgMatchDataSource,
    pub aggregates: Arc<AggregateStore>,
    pub price_provider: CachedPriceProvider<PgPriceProvider>,
    pub tx_source: PgTransactionSource,
}

impl AppContext {
    pub fn new(config: Config, pool: PgPool) -> Self {
        let price_provider =
            CachedPriceProvider::new(PgPriceProvider::new(pool.clone()), Duration::from_secs(config.price_cache.ttl_seconds));
        Self {
            fund_repo: WorkerFundRepo::new(pool.clone()),
            entity_repo: PgEntityRepository::new(pool.clone()),
            batch_repo: batch::PgBatchRepository::new(pool.clone()),
            bank_repo: PgBankRepository::new(pool.clone()),
            queue_repo: Arc::new(PgQueueRepository::new(pool.clone())),
            match_source: PgMatchDataSource::new(pool.clone()),
            tx_source: PgTransactionSource::new(pool.clone()),
            aggregates: Arc::new(AggregateStore::default()),
            price_provider,
            pool,
            config,
        }
    }

    pub async fn refresh_aggregates(&self) -> anyhow::Result<()> {
        aggregate::refresh(
            &self.aggregates,
            &self.tx_source,
            &self.price_provider,
            Duration::from_secs(self.config.aggregate.refresh_timeout_seconds),
        )
        .await?;
        self.price_provider.invalidate_all().await;
        Ok(())
    }
}
