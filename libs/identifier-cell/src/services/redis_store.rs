use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Connection, Pool};
use tracing::debug;

use crate::error::SequenceError;
use crate::models::{Counter, CounterKey};
use crate::services::counter_store::{CounterStore, CounterTransaction};

const DEFAULT_KEY_PREFIX: &str = "identifier_counter";

/// Counter store on Redis using optimistic compare-and-swap.
///
/// Redis has no row lock that survives across round trips, so a transaction
/// `WATCH`es each counter hash it reads and writes the new values in one
/// `MULTI`/`EXEC`. If any watched key changed (or was created) in between,
/// `EXEC` aborts and the commit reports [`SequenceError::WriteConflict`],
/// which the allocator retries.
pub struct RedisCounterStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisCounterStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }
}

fn redis_key(key_prefix: &str, key: &CounterKey) -> String {
    match key {
        CounterKey::Flat { namespace } => format!("{}:flat:{}", key_prefix, namespace),
        CounterKey::Periodic { prefix, year, month } => {
            format!("{}:periodic:{}:{:04}{:02}", key_prefix, prefix, year, month)
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>, SequenceError> {
        let mut conn = self.pool.get().await.map_err(|e| {
            SequenceError::TransientStoreFailure(format!("Failed to get Redis connection: {}", e))
        })?;

        // A transaction dropped without commit leaves its WATCH on the pooled connection.
        let _: () = redis::cmd("UNWATCH").query_async(&mut conn).await?;

        Ok(Box::new(RedisTransaction {
            conn,
            key_prefix: self.key_prefix.clone(),
            held: HashMap::new(),
        }))
    }
}

struct WatchedCounter {
    redis_key: String,
    value: u64,
    updated_at: DateTime<Utc>,
    dirty: bool,
}

pub struct RedisTransaction {
    conn: Connection,
    key_prefix: String,
    held: HashMap<CounterKey, WatchedCounter>,
}

#[async_trait]
impl CounterTransaction for RedisTransaction {
    async fn get_or_create(&mut self, key: &CounterKey) -> Result<Counter, SequenceError> {
        if let Some(watched) = self.held.get(key) {
            return Ok(Counter {
                key: key.clone(),
                value: watched.value,
                updated_at: watched.updated_at,
            });
        }

        let rkey = redis_key(&self.key_prefix, key);
        let _: () = redis::cmd("WATCH").arg(&rkey).query_async(&mut self.conn).await?;

        let (value, updated_at): (Option<u64>, Option<String>) = redis::cmd("HMGET")
            .arg(&rkey)
            .arg("value")
            .arg("updated_at")
            .query_async(&mut self.conn)
            .await?;

        // An absent hash reads as 0; creation happens in the EXEC that first increments it.
        let value = value.unwrap_or(0);
        let updated_at = updated_at
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        debug!("Watching counter {} at {}", key, value);
        self.held.insert(
            key.clone(),
            WatchedCounter {
                redis_key: rkey,
                value,
                updated_at,
                dirty: false,
            },
        );

        Ok(Counter {
            key: key.clone(),
            value,
            updated_at,
        })
    }

    async fn increment_and_save(&mut self, counter: &mut Counter) -> Result<u64, SequenceError> {
        let watched = self.held.get_mut(&counter.key).ok_or_else(|| {
            SequenceError::StoreInvariant(format!(
                "counter {} is not watched by this transaction",
                counter.key
            ))
        })?;

        let next = watched.value.checked_add(1).ok_or_else(|| {
            SequenceError::StoreInvariant(format!("counter {} is exhausted", counter.key))
        })?;
        let now = Utc::now();

        watched.value = next;
        watched.updated_at = now;
        watched.dirty = true;
        counter.value = next;
        counter.updated_at = now;
        Ok(next)
    }

    async fn commit(self: Box<Self>) -> Result<(), SequenceError> {
        let mut this = *self;

        let dirty: Vec<&WatchedCounter> = this.held.values().filter(|w| w.dirty).collect();
        if dirty.is_empty() {
            let _: () = redis::cmd("UNWATCH").query_async(&mut this.conn).await?;
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for watched in &dirty {
            pipe.cmd("HSET")
                .arg(&watched.redis_key)
                .arg("value")
                .arg(watched.value)
                .arg("updated_at")
                .arg(watched.updated_at.to_rfc3339())
                .ignore();
        }
        let conflicted: Vec<String> = dirty.iter().map(|w| w.redis_key.clone()).collect();

        // EXEC replies nil when a watched key changed since WATCH.
        let outcome: Option<()> = pipe.query_async(&mut this.conn).await?;
        match outcome {
            Some(()) => Ok(()),
            None => Err(SequenceError::WriteConflict(conflicted.join(","))),
        }
    }

    async fn rollback(self: Box<Self>) -> Result<(), SequenceError> {
        let mut this = *self;
        let _: () = redis::cmd("UNWATCH").query_async(&mut this.conn).await?;
        Ok(())
    }
}
