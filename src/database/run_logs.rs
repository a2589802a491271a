// file: src/database/run_logs.rs
use crate::models::{RunLog, RunStatus, SyncStats};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub async fn start(pool: &SqlitePool, now: DateTime<Utc>) -> Result<i64> {
    let result = sqlx::query("INSERT INTO run_logs (status, started_at) VALUES (?, ?)")
        .bind(RunStatus::Running)
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

pub async fn finish(
    pool: &SqlitePool,
    id: i64,
    status: RunStatus,
    now: DateTime<Utc>,
    stats: &SyncStats,
    error: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE run_logs SET status = ?, completed_at = ?, assignments_processed = ?,
             reminders_created = ?, reminders_updated = ?, reminders_cancelled = ?, error_message = ?
         WHERE id = ?",
    )
    .bind(status)
    .bind(now)
    .bind(stats.assignments_processed as i64)
    .bind(stats.created as i64)
    .bind(stats.updated as i64)
    .bind(stats.cancelled as i64)
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Separate entry for a retry that succeeded after the first attempt failed.
pub async fn insert_recovered(pool: &SqlitePool, now: DateTime<Utc>, stats: &SyncStats) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO run_logs (status, started_at, completed_at, assignments_processed,
             reminders_created, reminders_updated, reminders_cancelled)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(RunStatus::Recovered)
    .bind(now)
    .bind(now)
    .bind(stats.assignments_processed as i64)
    .bind(stats.created as i64)
    .bind(stats.updated as i64)
    .bind(stats.cancelled as i64)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Newest first.
pub async fn recent(pool: &SqlitePool, limit: i64) -> Result<Vec<RunLog>> {
    let logs = sqlx::query_as::<_, RunLog>(
        "SELECT id, status, started_at, completed_at, assignments_processed, reminders_created,
             reminders_updated, reminders_cancelled, error_message
         FROM run_logs ORDER BY id DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    #[tokio::test]
    async fn test_run_log_lifecycle() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();

        let id = start(&db.pool, now).await.unwrap();
        let running = recent(&db.pool, 1).await.unwrap();
        assert_eq!(running[0].status, RunStatus::Running);
        assert!(running[0].completed_at.is_none());

        let stats = SyncStats {
            assignments_processed: 5,
            created: 2,
            updated: 1,
            cancelled: 1,
        };
        finish(&db.pool, id, RunStatus::Success, now, &stats, None).await.unwrap();

        let logs = recent(&db.pool, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, RunStatus::Success);
        assert_eq!(logs[0].assignments_processed, 5);
        assert_eq!(logs[0].reminders_created, 2);
        assert!(logs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_and_recovered_entries() {
        let db = Database::in_memory().await.unwrap();
        let now = Utc::now();

        let id = start(&db.pool, now).await.unwrap();
        finish(&db.pool, id, RunStatus::Failed, now, &SyncStats::default(), Some("boom"))
            .await
            .unwrap();
        insert_recovered(&db.pool, now, &SyncStats::default()).await.unwrap();

        let logs = recent(&db.pool, 10).await.unwrap();
        assert_eq!(logs[0].status, RunStatus::Recovered);
        assert_eq!(logs[1].status, RunStatus::Failed);
        assert_eq!(logs[1].error_message.as_deref(), Some("boom"));
    }
}
