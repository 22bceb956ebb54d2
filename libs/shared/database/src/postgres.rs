use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

const MAX_CONNECTIONS: u32 = 10;

/// Opens the pool used by the counter store.
///
/// `acquire_timeout` bounds how long a caller waits for a free connection so
/// that an exhausted pool surfaces as an error instead of hanging a request.
pub async fn connect_postgres(database_url: &str, acquire_timeout: Duration) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await
        .context("Failed to connect to Postgres")?;

    info!("Postgres pool initialized ({} connections max)", MAX_CONNECTIONS);
    Ok(pool)
}
