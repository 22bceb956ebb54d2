use anyhow::{Context, Result};
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

/// Builds a Redis pool and checks it with a `PING` before handing it out.
pub async fn create_redis_pool(redis_url: &str) -> Result<Pool> {
    let cfg = Config::from_url(redis_url);
    let pool = cfg
        .create_pool(Some(Runtime::Tokio1))
        .context("Failed to create Redis pool")?;

    let mut conn = pool.get().await.context("Failed to connect to Redis")?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    info!("Redis pool initialized successfully");

    Ok(pool)
}
