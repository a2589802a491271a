// file: src/database/alarms.rs
use crate::models::AlarmRecord;
use anyhow::Result;
use sqlx::SqlitePool;

/// Swaps the assignment's alarm rows for `alarms` in one transaction.
pub async fn replace(pool: &SqlitePool, assignment_id: &str, alarms: &[AlarmRecord]) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM alarms WHERE assignment_id = ?")
        .bind(assignment_id)
        .execute(&mut *tx)
        .await?;

    for alarm in alarms {
        sqlx::query("INSERT INTO alarms (assignment_id, alarm_type, alarm_time) VALUES (?, ?, ?)")
            .bind(assignment_id)
            .bind(&alarm.alarm_type)
            .bind(alarm.alarm_time)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub async fn delete_for(pool: &SqlitePool, assignment_id: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM alarms WHERE assignment_id = ?")
        .bind(assignment_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

pub async fn get_for(pool: &SqlitePool, assignment_id: &str) -> Result<Vec<AlarmRecord>> {
    let alarms = sqlx::query_as::<_, AlarmRecord>(
        "SELECT assignment_id, alarm_type, alarm_time FROM alarms WHERE assignment_id = ? ORDER BY alarm_time",
    )
    .bind(assignment_id)
    .fetch_all(pool)
    .await?;

    Ok(alarms)
}
