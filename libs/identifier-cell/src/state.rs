use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use shared_config::{AppConfig, CounterBackend};
use shared_database::{postgres::connect_postgres, redis_pool::create_redis_pool};

use crate::error::SequenceError;
use crate::services::{
    BackfillRunner, CounterStore, EntityStore, MemoryCounterStore, PostgresCounterStore,
    RedisCounterStore, SequenceAllocator, SupabaseEntityStore,
};

/// Services shared by the identifier routes and the backfill CLI.
pub struct IdentifierCellState {
    pub config: Arc<AppConfig>,
    pub allocator: Arc<SequenceAllocator>,
    pub backfill: Arc<BackfillRunner>,
}

impl IdentifierCellState {
    pub fn new(
        config: Arc<AppConfig>,
        counters: Arc<dyn CounterStore>,
        entities: Arc<dyn EntityStore>,
    ) -> Self {
        let allocator = Arc::new(
            SequenceAllocator::new(counters).with_max_conflict_retries(config.max_conflict_retries),
        );
        let backfill = Arc::new(BackfillRunner::new(
            allocator.clone(),
            entities,
            config.backfill_policy,
        ));

        Self {
            config,
            allocator,
            backfill,
        }
    }

    /// Connects the configured counter backend and the Supabase entity store.
    pub async fn from_config(config: Arc<AppConfig>) -> Result<Self, SequenceError> {
        let counters = connect_counter_store(&config).await?;
        let entities: Arc<dyn EntityStore> = Arc::new(SupabaseEntityStore::new(&config));
        Ok(Self::new(config, counters, entities))
    }
}

async fn connect_counter_store(config: &AppConfig) -> Result<Arc<dyn CounterStore>, SequenceError> {
    let lock_timeout = Duration::from_millis(config.lock_timeout_ms);

    match config.counter_backend {
        CounterBackend::Postgres => {
            let url = config.database_url.as_deref().ok_or_else(|| {
                SequenceError::Configuration("COUNTER_BACKEND=postgres requires DATABASE_URL".to_string())
            })?;
            let pool = connect_postgres(url, lock_timeout)
                .await
                .map_err(|e| SequenceError::TransientStoreFailure(format!("{:#}", e)))?;

            let store = PostgresCounterStore::new(pool, lock_timeout);
            store.migrate().await?;
            info!("Using Postgres counter store");
            Ok(Arc::new(store))
        }
        CounterBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                SequenceError::Configuration("COUNTER_BACKEND=redis requires REDIS_URL".to_string())
            })?;
            let pool = create_redis_pool(url)
                .await
                .map_err(|e| SequenceError::TransientStoreFailure(format!("{:#}", e)))?;

            info!("Using Redis counter store");
            Ok(Arc::new(RedisCounterStore::new(pool)))
        }
        CounterBackend::Memory => {
            warn!("Using in-memory counter store; identifiers will restart with the process");
            Ok(Arc::new(MemoryCounterStore::new(lock_timeout)))
        }
    }
}
