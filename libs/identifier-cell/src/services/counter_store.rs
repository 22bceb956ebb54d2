use async_trait::async_trait;

use crate::error::SequenceError;
use crate::models::{Counter, CounterKey};

/// Durable keyed counters.
///
/// Counter rows are never deleted and their value only grows. All access
/// goes through a [`CounterTransaction`]; nothing reads a row outside one.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>, SequenceError>;
}

/// One read-increment-write-commit span.
///
/// Dropping a transaction without calling [`commit`](CounterTransaction::commit)
/// discards every increment made through it.
#[async_trait]
pub trait CounterTransaction: Send {
    /// Returns the row for `key`, creating it at 0 if absent, and holds it
    /// exclusively until the transaction ends.
    async fn get_or_create(&mut self, key: &CounterKey) -> Result<Counter, SequenceError>;

    /// Adds exactly one to `counter`, persists it inside the transaction and
    /// returns the new value.
    async fn increment_and_save(&mut self, counter: &mut Counter) -> Result<u64, SequenceError>;

    async fn commit(self: Box<Self>) -> Result<(), SequenceError>;

    async fn rollback(self: Box<Self>) -> Result<(), SequenceError>;
}
