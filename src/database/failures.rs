// file: src/database/failures.rs
use crate::models::RunFailureState;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub async fn get(pool: &SqlitePool) -> Result<RunFailureState> {
    let state = sqlx::query_as::<_, RunFailureState>(
        "SELECT consecutive_failures, last_success, last_failure, alert_sent FROM run_failures WHERE id = 1",
    )
    .fetch_one(pool)
    .await?;

    Ok(state)
}

/// Clears the streak and the alert flag. Returns the streak length before
/// clearing.
pub async fn record_success(pool: &SqlitePool, now: DateTime<Utc>) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let prior: i64 = sqlx::query_scalar("SELECT consecutive_failures FROM run_failures WHERE id = 1")
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query(
        "UPDATE run_failures SET consecutive_failures = 0, alert_sent = 0, last_success = ? WHERE id = 1",
    )
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(prior)
}

/// Extends the streak by one and returns its new length.
pub async fn record_failure(pool: &SqlitePool, now: DateTime<Utc>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "UPDATE run_failures SET consecutive_failures = consecutive_failures + 1, last_failure = ?
         WHERE id = 1 RETURNING consecutive_failures",
    )
    .bind(now)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

pub async fn mark_alert_sent(pool: &SqlitePool) -> Result<()> {
    sqlx::query("UPDATE run_failures SET alert_sent = 1 WHERE id = 1")
        .execute(pool)
        .await?;

    Ok(())
}
