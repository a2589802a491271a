// file: src/models/assignment.rs
use crate::classroom::RemoteCoursework;
use crate::error::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Submitted,
    NotSubmitted,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Submitted => "SUBMITTED",
            SubmissionStatus::NotSubmitted => "NOT_SUBMITTED",
        }
    }

    /// Collapses the source's native submission state. Only a handed-in or
    /// graded-and-returned submission counts as submitted.
    pub fn from_remote_state(state: &str) -> Self {
        match state {
            "TURNED_IN" | "RETURNED" => SubmissionStatus::Submitted,
            _ => SubmissionStatus::NotSubmitted,
        }
    }

    pub fn is_submitted(&self) -> bool {
        matches!(self, SubmissionStatus::Submitted)
    }
}

/// Content marker embedded in every calendar event of an assignment, used to
/// find its events again when the stored event reference is lost. Avoids
/// characters iCalendar escapes so it survives a round trip verbatim, and is
/// terminated so one id is never a prefix match of another.
pub fn fingerprint(assignment_id: &str, course_id: &str) -> String {
    format!("duesync:assignment={}:course={}:", assignment_id, course_id)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub due_at: DateTime<Utc>,
    pub last_seen_due_at: DateTime<Utc>,
    pub submission_status: SubmissionStatus,
    pub is_dead: bool,
    pub submission_checked_post_deadline: bool,
    pub event_uid: Option<String>,
    pub fingerprint: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    /// Record for an item observed for the first time with a future deadline.
    pub fn first_seen(
        item: &RemoteCoursework,
        due_at: DateTime<Utc>,
        category_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: item.id.clone(),
            course_id: item.course_id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            category_id: item.category_id.clone(),
            category_name,
            due_at,
            last_seen_due_at: due_at,
            submission_status: SubmissionStatus::NotSubmitted,
            is_dead: false,
            submission_checked_post_deadline: false,
            event_uid: None,
            fingerprint: fingerprint(&item.id, &item.course_id),
            last_checked: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Produces the record that results from writing `patch` over `self`.
    ///
    /// `is_dead` and `submission_checked_post_deadline` keep their stored
    /// values unless the patch names them. Dead records accept no writes.
    pub fn apply(&self, patch: AssignmentPatch, now: DateTime<Utc>) -> AppResult<Assignment> {
        if self.is_dead {
            return Err(AppError::DeadAssignment(self.id.clone()));
        }

        let mut next = self.clone();
        if let Some((title, description)) = patch.details {
            next.title = title;
            next.description = description;
        }
        if let Some((category_id, category_name)) = patch.category {
            next.category_id = category_id;
            next.category_name = category_name;
        }
        if let Some(due_at) = patch.due_at {
            next.due_at = due_at;
            next.last_seen_due_at = due_at;
        }
        if let Some(status) = patch.submission_status {
            next.submission_status = status;
        }
        if let Some(is_dead) = patch.is_dead {
            next.is_dead = is_dead;
        }
        if let Some(checked) = patch.submission_checked_post_deadline {
            next.submission_checked_post_deadline = checked;
        }
        if let Some(uid) = patch.event_uid {
            next.event_uid = Some(uid);
        }
        if let Some(checked_at) = patch.last_checked {
            next.last_checked = Some(checked_at);
        }
        next.updated_at = now;
        Ok(next)
    }
}

/// A partial write against a stored [`Assignment`].
///
/// Built through its methods only, so the due instant can never move without
/// `last_seen_due_at`, and the post-deadline check can only be re-armed by a
/// deadline extension.
#[derive(Debug, Clone, Default)]
pub struct AssignmentPatch {
    details: Option<(String, Option<String>)>,
    category: Option<(Option<String>, Option<String>)>,
    due_at: Option<DateTime<Utc>>,
    submission_status: Option<SubmissionStatus>,
    is_dead: Option<bool>,
    submission_checked_post_deadline: Option<bool>,
    event_uid: Option<String>,
    last_checked: Option<DateTime<Utc>>,
}

impl AssignmentPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn details(mut self, title: String, description: Option<String>) -> Self {
        self.details = Some((title, description));
        self
    }

    pub fn category(mut self, category_id: Option<String>, category_name: Option<String>) -> Self {
        self.category = Some((category_id, category_name));
        self
    }

    /// Moves the deadline and re-arms the post-deadline submission check.
    pub fn extend_deadline(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self.submission_checked_post_deadline = Some(false);
        self
    }

    pub fn submission_status(mut self, status: SubmissionStatus) -> Self {
        self.submission_status = Some(status);
        self
    }

    pub fn mark_dead(mut self) -> Self {
        self.is_dead = Some(true);
        self
    }

    pub fn mark_checked_post_deadline(mut self) -> Self {
        self.submission_checked_post_deadline = Some(true);
        self
    }

    pub fn event_uid(mut self, uid: String) -> Self {
        self.event_uid = Some(uid);
        self
    }

    pub fn last_checked(mut self, at: DateTime<Utc>) -> Self {
        self.last_checked = Some(at);
        self
    }
}
