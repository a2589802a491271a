// file: src/database/courses.rs
use crate::classroom::{RemoteCourse, RemoteTopic};
use crate::models::{Category, Course};
use anyhow::Result;
use sqlx::SqlitePool;

const COURSE_COLUMNS: &str = "id, name, section, description, enabled, sync_without_categories, \
                              calendar_name, course_code, color";

/// Mirrors a remote course. Only the remote-owned columns are written on
/// conflict; a new course starts disabled.
pub async fn upsert_course(pool: &SqlitePool, course: &RemoteCourse) -> Result<()> {
    sqlx::query(
        "INSERT INTO courses (id, name, section, description, updated_at) VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             section = excluded.section,
             description = excluded.description,
             updated_at = excluded.updated_at",
    )
    .bind(&course.id)
    .bind(&course.name)
    .bind(&course.section)
    .bind(&course.description)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn upsert_category(pool: &SqlitePool, topic: &RemoteTopic) -> Result<()> {
    sqlx::query(
        "INSERT INTO categories (id, course_id, name, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
             course_id = excluded.course_id,
             name = excluded.name,
             updated_at = excluded.updated_at",
    )
    .bind(&topic.id)
    .bind(&topic.course_id)
    .bind(&topic.name)
    .bind(chrono::Utc::now())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_course(pool: &SqlitePool, course_id: &str) -> Result<Option<Course>> {
    let course = sqlx::query_as::<_, Course>(&format!(
        "SELECT {} FROM courses WHERE id = ?",
        COURSE_COLUMNS
    ))
    .bind(course_id)
    .fetch_optional(pool)
    .await?;

    Ok(course)
}

pub async fn get_enabled(pool: &SqlitePool) -> Result<Vec<Course>> {
    let courses = sqlx::query_as::<_, Course>(&format!(
        "SELECT {} FROM courses WHERE enabled = 1 ORDER BY name",
        COURSE_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(courses)
}

pub async fn get_categories(pool: &SqlitePool, course_id: &str) -> Result<Vec<Category>> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, course_id, name, enabled FROM categories WHERE course_id = ? ORDER BY name",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;

    Ok(categories)
}

pub async fn get_category(pool: &SqlitePool, category_id: &str) -> Result<Option<Category>> {
    let category = sqlx::query_as::<_, Category>(
        "SELECT id, course_id, name, enabled FROM categories WHERE id = ?",
    )
    .bind(category_id)
    .fetch_optional(pool)
    .await?;

    Ok(category)
}

pub async fn set_course_enabled(pool: &SqlitePool, course_id: &str, enabled: bool) -> Result<()> {
    sqlx::query("UPDATE courses SET enabled = ? WHERE id = ?")
        .bind(enabled)
        .bind(course_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_sync_without_categories(
    pool: &SqlitePool,
    course_id: &str,
    enabled: bool,
) -> Result<()> {
    sqlx::query("UPDATE courses SET sync_without_categories = ? WHERE id = ?")
        .bind(enabled)
        .bind(course_id)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn set_category_enabled(pool: &SqlitePool, category_id: &str, enabled: bool) -> Result<()> {
    sqlx::query("UPDATE categories SET enabled = ? WHERE id = ?")
        .bind(enabled)
        .bind(category_id)
        .execute(pool)
        .await?;

    Ok(())
}
