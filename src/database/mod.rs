// file: src/database/mod.rs

use crate::classroom::{RemoteCourse, RemoteTopic};
use crate::models::{AlarmRecord, Assignment, Category, Course, RunFailureState, RunLog, RunStatus, SyncStats};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{migrate::MigrateDatabase, Sqlite};

// Declare submodules
pub mod alarms;
pub mod assignments;
pub mod courses;
pub mod failures;
pub mod run_logs;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `url` and applies the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let db_exists = Sqlite::database_exists(url)
            .await
            .context("Failed to check if database exists")?;
        if !db_exists {
            info!("Creating database");
            Sqlite::create_database(url)
                .await
                .context("Failed to create database")?;
        }

        let pool = SqlitePool::connect(url)
            .await
            .context("Failed to connect to database")?;

        run_schema(&pool).await.context("Failed to run database schema")?;

        info!("Database initialized successfully");
        Ok(Database { pool })
    }

    /// Private in-memory database. One connection, since every connection to
    /// `sqlite::memory:` would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        run_schema(&pool).await.context("Failed to run database schema")?;
        Ok(Database { pool })
    }

    // --- Course Delegates ---

    pub async fn upsert_course(&self, course: &RemoteCourse) -> Result<()> {
        courses::upsert_course(&self.pool, course).await
    }

    pub async fn upsert_category(&self, topic: &RemoteTopic) -> Result<()> {
        courses::upsert_category(&self.pool, topic).await
    }

    pub async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        courses::get_course(&self.pool, course_id).await
    }

    pub async fn get_enabled_courses(&self) -> Result<Vec<Course>> {
        courses::get_enabled(&self.pool).await
    }

    pub async fn get_categories(&self, course_id: &str) -> Result<Vec<Category>> {
        courses::get_categories(&self.pool, course_id).await
    }

    pub async fn get_category(&self, category_id: &str) -> Result<Option<Category>> {
        courses::get_category(&self.pool, category_id).await
    }

    pub async fn set_course_enabled(&self, course_id: &str, enabled: bool) -> Result<()> {
        courses::set_course_enabled(&self.pool, course_id, enabled).await
    }

    pub async fn set_sync_without_categories(&self, course_id: &str, enabled: bool) -> Result<()> {
        courses::set_sync_without_categories(&self.pool, course_id, enabled).await
    }

    pub async fn set_category_enabled(&self, category_id: &str, enabled: bool) -> Result<()> {
        courses::set_category_enabled(&self.pool, category_id, enabled).await
    }

    // --- Assignment Delegates ---

    pub async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>> {
        assignments::get(&self.pool, id).await
    }

    pub async fn get_assignments(&self) -> Result<Vec<Assignment>> {
        assignments::get_all(&self.pool).await
    }

    pub async fn save_assignment(&self, assignment: &Assignment) -> Result<()> {
        assignments::upsert(&self.pool, assignment).await
    }

    // --- Alarm Delegates ---

    pub async fn replace_alarms(&self, assignment_id: &str, alarms: &[AlarmRecord]) -> Result<()> {
        alarms::replace(&self.pool, assignment_id, alarms).await
    }

    pub async fn delete_alarms(&self, assignment_id: &str) -> Result<u64> {
        alarms::delete_for(&self.pool, assignment_id).await
    }

    pub async fn get_alarms(&self, assignment_id: &str) -> Result<Vec<AlarmRecord>> {
        alarms::get_for(&self.pool, assignment_id).await
    }

    // --- Failure State Delegates ---

    pub async fn get_failure_state(&self) -> Result<RunFailureState> {
        failures::get(&self.pool).await
    }

    pub async fn record_run_success(&self, now: DateTime<Utc>) -> Result<i64> {
        failures::record_success(&self.pool, now).await
    }

    pub async fn record_run_failure(&self, now: DateTime<Utc>) -> Result<i64> {
        failures::record_failure(&self.pool, now).await
    }

    pub async fn mark_alert_sent(&self) -> Result<()> {
        failures::mark_alert_sent(&self.pool).await
    }

    // --- Run Log Delegates ---

    pub async fn start_run_log(&self, now: DateTime<Utc>) -> Result<i64> {
        run_logs::start(&self.pool, now).await
    }

    pub async fn finish_run_log(
        &self,
        id: i64,
        status: RunStatus,
        now: DateTime<Utc>,
        stats: &SyncStats,
        error: Option<&str>,
    ) -> Result<()> {
        run_logs::finish(&self.pool, id, status, now, stats, error).await
    }

    pub async fn insert_recovered_log(&self, now: DateTime<Utc>, stats: &SyncStats) -> Result<i64> {
        run_logs::insert_recovered(&self.pool, now, stats).await
    }

    pub async fn recent_run_logs(&self, limit: i64) -> Result<Vec<RunLog>> {
        run_logs::recent(&self.pool, limit).await
    }
}

async fn run_schema(pool: &SqlitePool) -> Result<()> {
    let schema = include_str!("schema.sql");

    let mut current_statement = String::new();
    for line in schema.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }

        current_statement.push_str(line);
        current_statement.push('\n');

        if trimmed.ends_with(';') {
            sqlx::query(&current_statement).execute(pool).await?;
            current_statement.clear();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::in_memory().await.unwrap();
        assert!(!db.pool.is_closed());

        let state = db.get_failure_state().await.unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.alert_sent);
    }

    #[tokio::test]
    async fn test_connect_file_database_and_reapply_schema() {
        let temp_file = NamedTempFile::new().unwrap();
        let url = format!("sqlite:{}?mode=rwc", temp_file.path().to_str().unwrap());

        let db = Database::connect(&url).await.unwrap();
        db.record_run_failure(Utc::now()).await.unwrap();
        db.pool.close().await;

        // Reopening must not reset the singleton row.
        let reopened = Database::connect(&url).await.unwrap();
        let state = reopened.get_failure_state().await.unwrap();
        assert_eq!(state.consecutive_failures, 1);
    }
}
