//! Remote coursework source
//!
//! Snapshot types for what the classroom service reports about courses,
//! topics and coursework, and the [`CourseworkSource`] seam the sync engine
//! reads them through.

use crate::models::SubmissionStatus;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod google;

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCourse {
    pub id: String,
    pub name: String,
    pub section: Option<String>,
    pub description: Option<String>,
}

/// A topic of a course. Topics are the categories assignments are filtered
/// and labelled by.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTopic {
    pub id: String,
    pub course_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCoursework {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    /// `None` when the item carries no due date; such items are never synced.
    pub due_at: Option<DateTime<Utc>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CourseworkSource: Send + Sync {
    /// Every active course visible to the account, all pages.
    async fn list_courses(&self) -> Result<Vec<RemoteCourse>>;

    async fn list_topics(&self, course_id: &str) -> Result<Vec<RemoteTopic>>;

    async fn list_coursework(&self, course_id: &str) -> Result<Vec<RemoteCoursework>>;

    /// The account's own submission state for one coursework item.
    async fn submission_status(
        &self,
        course_id: &str,
        coursework_id: &str,
    ) -> Result<SubmissionStatus>;
}
