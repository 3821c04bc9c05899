//! Database health check query.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Round-trip a trivial query and report how long it took.
pub async fn ping(pool: &PgPool) -> Result<Duration> {
    let start = Instant::now();
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await
        .context("database ping failed")?;
    Ok(start.elapsed())
}
