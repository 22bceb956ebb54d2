//! Counter store backed by Postgres row locks.
//!
//! Each allocation runs in its own transaction:
//!
//! ```sql
//! BEGIN;
//! SET LOCAL lock_timeout = '5000ms';
//! INSERT INTO sequence_counters (namespace, value, updated_at)
//!     VALUES ($1, 0, NOW()) ON CONFLICT (namespace) DO NOTHING;
//! SELECT value, updated_at FROM sequence_counters WHERE namespace = $1 FOR UPDATE;
//! UPDATE sequence_counters SET value = value + 1, updated_at = NOW()
//!     WHERE namespace = $1 RETURNING value, updated_at;
//! COMMIT;
//! ```
//!
//! The insert makes first-time creation race free: a second creator blocks on
//! the unique index until the first commits and then inserts nothing. The
//! `FOR UPDATE` lock is held from the read until commit, which serializes
//! every allocator touching the same namespace.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

use crate::error::SequenceError;
use crate::models::{Counter, CounterKey};
use crate::services::counter_store::{CounterStore, CounterTransaction};

pub struct PostgresCounterStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresCounterStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Applies the embedded counter schema migrations.
    pub async fn migrate(&self) -> Result<(), SequenceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SequenceError::Configuration(format!("counter migrations failed: {}", e)))?;
        info!("Counter schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl CounterStore for PostgresCounterStore {
    async fn begin(&self) -> Result<Box<dyn CounterTransaction>, SequenceError> {
        let mut tx = self.pool.begin().await?;

        // SET does not accept bind parameters; the value is an integer we format ourselves.
        let statement = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&statement).execute(&mut *tx).await?;

        Ok(Box::new(PostgresTransaction { tx }))
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

fn to_counter(key: &CounterKey, value: i64, updated_at: DateTime<Utc>) -> Result<Counter, SequenceError> {
    let value = u64::try_from(value).map_err(|_| {
        SequenceError::StoreInvariant(format!("counter {} holds negative value {}", key, value))
    })?;
    Ok(Counter {
        key: key.clone(),
        value,
        updated_at,
    })
}

fn month_param(month: u32) -> Result<i32, SequenceError> {
    i32::try_from(month)
        .map_err(|_| SequenceError::InvalidNamespaceInput(format!("month {} is out of range", month)))
}

#[async_trait]
impl CounterTransaction for PostgresTransaction {
    async fn get_or_create(&mut self, key: &CounterKey) -> Result<Counter, SequenceError> {
        let (value, updated_at): (i64, DateTime<Utc>) = match key {
            CounterKey::Flat { namespace } => {
                sqlx::query(
                    r#"
                    INSERT INTO sequence_counters (namespace, value, updated_at)
                    VALUES ($1, 0, NOW())
                    ON CONFLICT (namespace) DO NOTHING
                    "#,
                )
                .bind(namespace)
                .execute(&mut *self.tx)
                .await?;

                sqlx::query_as(
                    r#"
                    SELECT value, updated_at
                    FROM sequence_counters
                    WHERE namespace = $1
                    FOR UPDATE
                    "#,
                )
                .bind(namespace)
                .fetch_one(&mut *self.tx)
                .await?
            }
            CounterKey::Periodic { prefix, year, month } => {
                let month = month_param(*month)?;
                sqlx::query(
                    r#"
                    INSERT INTO periodic_sequence_counters (prefix, year, month, value, updated_at)
                    VALUES ($1, $2, $3, 0, NOW())
                    ON CONFLICT (prefix, year, month) DO NOTHING
                    "#,
                )
                .bind(prefix)
                .bind(*year)
                .bind(month)
                .execute(&mut *self.tx)
                .await?;

                sqlx::query_as(
                    r#"
                    SELECT value, updated_at
                    FROM periodic_sequence_counters
                    WHERE prefix = $1 AND year = $2 AND month = $3
                    FOR UPDATE
                    "#,
                )
                .bind(prefix)
                .bind(*year)
                .bind(month)
                .fetch_one(&mut *self.tx)
                .await?
            }
        };

        debug!("Locked counter {} at {}", key, value);
        to_counter(key, value, updated_at)
    }

    async fn increment_and_save(&mut self, counter: &mut Counter) -> Result<u64, SequenceError> {
        let (value, updated_at): (i64, DateTime<Utc>) = match &counter.key {
            CounterKey::Flat { namespace } => {
                sqlx::query_as(
                    r#"
                    UPDATE sequence_counters
                    SET value = value + 1,
                        updated_at = NOW()
                    WHERE namespace = $1
                    RETURNING value, updated_at
                    "#,
                )
                .bind(namespace)
                .fetch_one(&mut *self.tx)
                .await?
            }
            CounterKey::Periodic { prefix, year, month } => {
                sqlx::query_as(
                    r#"
                    UPDATE periodic_sequence_counters
                    SET value = value + 1,
                        updated_at = NOW()
                    WHERE prefix = $1 AND year = $2 AND month = $3
                    RETURNING value, updated_at
                    "#,
                )
                .bind(prefix)
                .bind(*year)
                .bind(month_param(*month)?)
                .fetch_one(&mut *self.tx)
                .await?
            }
        };

        let saved = to_counter(&counter.key, value, updated_at)?;
        counter.value = saved.value;
        counter.updated_at = saved.updated_at;
        Ok(saved.value)
    }

    async fn commit(self: Box<Self>) -> Result<(), SequenceError> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), SequenceError> {
        let this = *self;
        this.tx.rollback().await?;
        Ok(())
    }
}
