use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, warn};

use crate::error::SequenceError;
use crate::models::{CounterKey, IdentifierKind, TICKET_NUMBER_PREFIX, TICKET_NUMBER_WIDTH};
use crate::services::counter_store::{CounterStore, CounterTransaction};
use crate::services::format::{
    render_identifier, render_periodic_identifier, validate_digit_width, validate_flat_namespace,
    validate_namespace, validate_period,
};

const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 5;

/// Issues prefixed, strictly increasing public identifiers.
///
/// The allocator is the only component that touches counter rows. Every
/// value comes out of one store transaction that locks the row, increments
/// it and commits; the value is returned only after the commit succeeded, so
/// a failed call never hands out a number and a retried call never repeats
/// one. Numbers lost to a transaction that incremented and then rolled back
/// show up as gaps.
pub struct SequenceAllocator {
    store: Arc<dyn CounterStore>,
    max_conflict_retries: u32,
}

impl SequenceAllocator {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, max_conflict_retries: u32) -> Self {
        self.max_conflict_retries = max_conflict_retries;
        self
    }

    /// `allocate("DOC", 4)` on a fresh namespace returns `DOC-0001`.
    pub async fn allocate(&self, namespace: &str, digit_width: usize) -> Result<String, SequenceError> {
        validate_flat_namespace(namespace)?;
        validate_digit_width(digit_width)?;

        let value = self.next_value(&CounterKey::flat(namespace)).await?;
        let identifier = render_identifier(namespace, value, digit_width);
        debug!("Allocated {}", identifier);
        Ok(identifier)
    }

    /// `allocate_periodic("DP-SUP", 2026, 1, 6)` returns `DP-SUP-202601-000001`
    /// first; each (prefix, year, month) has its own counter.
    pub async fn allocate_periodic(
        &self,
        prefix: &str,
        year: i32,
        month: u32,
        digit_width: usize,
    ) -> Result<String, SequenceError> {
        validate_namespace(prefix)?;
        validate_period(year, month)?;
        validate_digit_width(digit_width)?;

        let value = self
            .next_value(&CounterKey::periodic(prefix, year, month))
            .await?;
        let identifier = render_periodic_identifier(prefix, year, month, value, digit_width);
        debug!("Allocated {}", identifier);
        Ok(identifier)
    }

    /// Next public identifier for a new entity of `kind`.
    pub async fn issue(&self, kind: IdentifierKind) -> Result<String, SequenceError> {
        self.allocate(kind.prefix(), kind.digit_width()).await
    }

    /// Support ticket number for a ticket created at `at`.
    pub async fn issue_ticket_number(&self, at: DateTime<Utc>) -> Result<String, SequenceError> {
        self.allocate_periodic(TICKET_NUMBER_PREFIX, at.year(), at.month(), TICKET_NUMBER_WIDTH)
            .await
    }

    async fn next_value(&self, key: &CounterKey) -> Result<u64, SequenceError> {
        let mut attempt = 0;
        loop {
            match self.increment_once(key).await {
                Err(SequenceError::WriteConflict(detail)) => {
                    if attempt >= self.max_conflict_retries {
                        return Err(SequenceError::TransientStoreFailure(format!(
                            "counter {} still contended after {} retries ({})",
                            key, self.max_conflict_retries, detail
                        )));
                    }
                    attempt += 1;
                    warn!(
                        "Write conflict on counter {}, retrying ({}/{})",
                        key, attempt, self.max_conflict_retries
                    );
                }
                outcome => return outcome,
            }
        }
    }

    async fn increment_once(&self, key: &CounterKey) -> Result<u64, SequenceError> {
        let mut tx = self.store.begin().await?;

        let value = match Self::lock_and_increment(tx.as_mut(), key).await {
            Ok(value) => value,
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback of counter {} failed: {}", key, rollback_err);
                }
                return Err(err);
            }
        };

        tx.commit().await?;
        Ok(value)
    }

    async fn lock_and_increment(
        tx: &mut dyn CounterTransaction,
        key: &CounterKey,
    ) -> Result<u64, SequenceError> {
        let mut counter = tx.get_or_create(key).await?;
        tx.increment_and_save(&mut counter).await
    }
}
