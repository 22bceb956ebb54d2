pub mod allocator;
pub mod backfill;
pub mod counter_store;
pub mod entity_store;
pub mod format;
pub mod memory_store;
pub mod postgres_store;
pub mod redis_store;
pub mod supabase_entities;

pub use allocator::SequenceAllocator;
pub use backfill::BackfillRunner;
pub use counter_store::{CounterStore, CounterTransaction};
pub use entity_store::{EntityStore, MemoryEntityStore};
pub use memory_store::MemoryCounterStore;
pub use postgres_store::PostgresCounterStore;
pub use redis_store::RedisCounterStore;
pub use supabase_entities::SupabaseEntityStore;
