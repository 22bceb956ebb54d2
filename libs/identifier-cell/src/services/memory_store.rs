use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::SequenceError;
use crate::models::{Counter, CounterKey};
use crate::services::counter_store::{CounterStore, CounterTransaction};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct CounterRow {
    value: u64,
    updated_at: DateTime<Utc>,
}

type RowMap = HashMap<CounterKey, Arc<Mutex<CounterRow>>>;

/// In-process counter store with per-row exclusive locks.
///
/// Each row sits behind its own async mutex. A transaction keeps the owned
/// guard from `get_or_create` until it commits or is dropped, and increments
/// are staged on the transaction so an uncommitted value is never visible.
pub struct MemoryCounterStore {
    rows: Arc<Mutex<RowMap>>,
    lock_timeout: Duration,
}

impl MemoryCounterStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            rows: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout,
        }
    }

    /// Last committed value, waiting for any transaction holding the row.
    pub async fn current_value(&self, key: &CounterKey) -> Option<u64> {
        let row = self.rows.lock().await.get(key).cloned()?;
        let value = row.lock().await.value;
        Some(value)
    }

    pub async fn row_count(&self) -> usize {
        self.rows.lock().await.len()
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>, SequenceError> {
        Ok(Box::new(MemoryTransaction {
            rows: self.rows.clone(),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
        }))
    }
}

struct HeldRow {
    guard: OwnedMutexGuard<CounterRow>,
    staged: Option<(u64, DateTime<Utc>)>,
}

impl HeldRow {
    fn snapshot(&self, key: &CounterKey) -> Counter {
        let (value, updated_at) = self
            .staged
            .unwrap_or((self.guard.value, self.guard.updated_at));
        Counter {
            key: key.clone(),
            value,
            updated_at,
        }
    }
}

pub struct MemoryTransaction {
    rows: Arc<Mutex<RowMap>>,
    lock_timeout: Duration,
    held: HashMap<CounterKey, HeldRow>,
}

impl MemoryTransaction {
    async fn row_for(&self, key: &CounterKey) -> Arc<Mutex<CounterRow>> {
        // The map lock makes creation of a missing row atomic, so racing
        // first callers all end up contending on the same row mutex.
        let mut rows = self.rows.lock().await;
        rows.entry(key.clone())
            .or_insert_with(|| {
                debug!("Creating counter row {}", key);
                Arc::new(Mutex::new(CounterRow {
                    value: 0,
                    updated_at: Utc::now(),
                }))
            })
            .clone()
    }
}

#[async_trait]
impl CounterTransaction for MemoryTransaction {
    async fn get_or_create(&mut self, key: &CounterKey) -> Result<Counter, SequenceError> {
        if let Some(held) = self.held.get(key) {
            return Ok(held.snapshot(key));
        }

        let row = self.row_for(key).await;
        let guard = tokio::time::timeout(self.lock_timeout, row.lock_owned())
            .await
            .map_err(|_| {
                SequenceError::TransientStoreFailure(format!(
                    "lock wait timeout after {:?} on counter {}",
                    self.lock_timeout, key
                ))
            })?;

        let held = HeldRow { guard, staged: None };
        let counter = held.snapshot(key);
        self.held.insert(key.clone(), held);
        Ok(counter)
    }

    async fn increment_and_save(&mut self, counter: &mut Counter) -> Result<u64, SequenceError> {
        let held = self.held.get_mut(&counter.key).ok_or_else(|| {
            SequenceError::StoreInvariant(format!(
                "counter {} is not held by this transaction",
                counter.key
            ))
        })?;

        let current = held.staged.map(|(value, _)| value).unwrap_or(held.guard.value);
        let next = current.checked_add(1).ok_or_else(|| {
            SequenceError::StoreInvariant(format!("counter {} is exhausted", counter.key))
        })?;
        let now = Utc::now();

        held.staged = Some((next, now));
        counter.value = next;
        counter.updated_at = now;
        Ok(next)
    }

    async fn commit(self: Box<Self>) -> Result<(), SequenceError> {
        let this = *self;
        for (_, mut held) in this.held {
            if let Some((value, updated_at)) = held.staged {
                held.guard.value = value;
                held.guard.updated_at = updated_at;
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), SequenceError> {
        Ok(())
    }
}
