// file: src/database/assignments.rs
use crate::models::Assignment;
use anyhow::Result;
use sqlx::SqlitePool;

const COLUMNS: &str = "id, course_id, title, description, category_id, category_name, due_at, \
                       last_seen_due_at, submission_status, is_dead, submission_checked_post_deadline, \
                       event_uid, fingerprint, last_checked, created_at, updated_at";

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<Assignment>> {
    let assignment = sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {} FROM assignments WHERE id = ?",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(assignment)
}

pub async fn get_all(pool: &SqlitePool) -> Result<Vec<Assignment>> {
    let assignments = sqlx::query_as::<_, Assignment>(&format!(
        "SELECT {} FROM assignments ORDER BY due_at",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(assignments)
}

/// Writes the full record by id. A stored row that is already dead is left
/// untouched.
pub async fn upsert(pool: &SqlitePool, assignment: &Assignment) -> Result<()> {
    let result = sqlx::query(
        "INSERT INTO assignments (id, course_id, title, description, category_id, category_name,
             due_at, last_seen_due_at, submission_status, is_dead, submission_checked_post_deadline,
             event_uid, fingerprint, last_checked, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             course_id = excluded.course_id,
             title = excluded.title,
             description = excluded.description,
             category_id = excluded.category_id,
             category_name = excluded.category_name,
             due_at = excluded.due_at,
             last_seen_due_at = excluded.last_seen_due_at,
             submission_status = excluded.submission_status,
             is_dead = excluded.is_dead,
             submission_checked_post_deadline = excluded.submission_checked_post_deadline,
             event_uid = excluded.event_uid,
             fingerprint = excluded.fingerprint,
             last_checked = excluded.last_checked,
             updated_at = excluded.updated_at
         WHERE assignments.is_dead = 0",
    )
    .bind(&assignment.id)
    .bind(&assignment.course_id)
    .bind(&assignment.title)
    .bind(&assignment.description)
    .bind(&assignment.category_id)
    .bind(&assignment.category_name)
    .bind(assignment.due_at)
    .bind(assignment.last_seen_due_at)
    .bind(assignment.submission_status)
    .bind(assignment.is_dead)
    .bind(assignment.submission_checked_post_deadline)
    .bind(&assignment.event_uid)
    .bind(&assignment.fingerprint)
    .bind(assignment.last_checked)
    .bind(assignment.created_at)
    .bind(assignment.updated_at)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        log::warn!("Ignored write to dead assignment {}", assignment.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::RemoteCoursework;
    use crate::database::Database;
    use crate::models::{AssignmentPatch, SubmissionStatus};
    use chrono::{Duration, TimeZone, Utc};

    fn new_assignment() -> Assignment {
        let now = Utc.with_ymd_and_hms(2025, 3, 8, 4, 30, 0).unwrap();
        let item = RemoteCoursework {
            id: "cw-1".to_string(),
            course_id: "c-1".to_string(),
            title: "Lab 3".to_string(),
            description: Some("Pendulum".to_string()),
            category_id: None,
            due_at: Some(now + Duration::days(2)),
        };
        Assignment::first_seen(&item, now + Duration::days(2), None, now)
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = Database::in_memory().await.unwrap();
        let assignment = new_assignment();
        upsert(&db.pool, &assignment).await.unwrap();

        let stored = get(&db.pool, "cw-1").await.unwrap().unwrap();
        assert_eq!(stored, assignment);
        assert_eq!(stored.submission_status, SubmissionStatus::NotSubmitted);
        assert!(get(&db.pool, "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_overwrites_by_id() {
        let db = Database::in_memory().await.unwrap();
        let assignment = new_assignment();
        upsert(&db.pool, &assignment).await.unwrap();

        let later = assignment.due_at + Duration::days(1);
        let extended = assignment
            .apply(AssignmentPatch::new().extend_deadline(later), assignment.updated_at)
            .unwrap();
        upsert(&db.pool, &extended).await.unwrap();

        let stored = get(&db.pool, "cw-1").await.unwrap().unwrap();
        assert_eq!(stored.due_at, later);
        assert_eq!(stored.last_seen_due_at, later);
        assert_eq!(get_all(&db.pool).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dead_row_is_never_overwritten() {
        let db = Database::in_memory().await.unwrap();
        let assignment = new_assignment();
        let dead = assignment
            .apply(AssignmentPatch::new().mark_dead(), assignment.updated_at)
            .unwrap();
        upsert(&db.pool, &dead).await.unwrap();

        // A stale copy that still thinks it is alive.
        let mut stale = assignment.clone();
        stale.title = "Renamed".to_string();
        upsert(&db.pool, &stale).await.unwrap();

        let stored = get(&db.pool, "cw-1").await.unwrap().unwrap();
        assert!(stored.is_dead);
        assert_eq!(stored.title, "Lab 3");
    }
}
