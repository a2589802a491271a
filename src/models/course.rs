// file: src/models/course.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A course as mirrored locally. `enabled`, `sync_without_categories`,
/// `calendar_name`, `course_code` and `color` belong to the dashboard and are
/// never overwritten by a remote refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: String,
    pub name: String,
    pub section: Option<String>,
    pub description: Option<String>,
    pub enabled: bool,
    pub sync_without_categories: bool,
    pub calendar_name: Option<String>,
    pub course_code: Option<String>,
    pub color: Option<String>,
}

impl Course {
    /// Name of the calendar this course's deadlines land in.
    pub fn calendar_name(&self) -> &str {
        self.calendar_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: String,
    pub course_id: String,
    pub name: String,
    pub enabled: bool,
}
