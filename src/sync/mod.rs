//! Reconciliation engine
//!
//! One pass walks every enabled course, reads its coursework from the remote
//! source and moves each assignment through `UNSEEN -> ACTIVE -> DEAD`,
//! keeping the calendar and the alarm table in step. A dead assignment is
//! never touched again.

use crate::alarms::compute_alarms;
use crate::calendar::{self, build_event_set, event_description, new_event_uid, CalendarStore};
use crate::classroom::{CourseworkSource, RemoteCoursework};
use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::models::{AlarmRecord, Assignment, AssignmentPatch, Category, Course, SubmissionStatus, SyncStats};
use crate::utils::logging;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_CATEGORY_LABEL: &str = "GENERAL";

/// The slice of configuration the engine needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub timezone: Tz,
    pub alarm_intervals: Vec<u32>,
    pub window_start_hour: u32,
}

/// `[CATEGORY] title – course`
pub fn reminder_title(category_name: Option<&str>, title: &str, course_name: &str) -> String {
    let label = category_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(DEFAULT_CATEGORY_LABEL);
    format!("[{}] {} – {}", label.to_uppercase(), title, course_name)
}

pub struct SyncEngine {
    db: Database,
    source: Arc<dyn CourseworkSource>,
    calendar: Arc<dyn CalendarStore>,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        db: Database,
        source: Arc<dyn CourseworkSource>,
        calendar: Arc<dyn CalendarStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            db,
            source,
            calendar,
            settings,
        }
    }

    /// Runs one full reconciliation pass as of `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> AppResult<SyncStats> {
        let started = Instant::now();
        info!(
            "Starting sync at {}",
            now.with_timezone(&self.settings.timezone).format("%Y-%m-%d %H:%M %Z")
        );

        self.refresh_courses().await?;

        let courses = self.db.get_enabled_courses().await?;
        if courses.is_empty() {
            warn!("No enabled courses. Enable courses in the dashboard.");
        }

        let mut stats = SyncStats::default();
        for course in &courses {
            self.sync_course(course, now, &mut stats).await?;
        }

        logging::log_sync_summary(&stats, started.elapsed().as_millis() as u64);
        Ok(stats)
    }

    /// Mirrors remote courses and topics into the local tables. A failure to
    /// list courses aborts the run; a failing topic listing only loses that
    /// course's categories for this pass.
    async fn refresh_courses(&self) -> AppResult<()> {
        let courses = self
            .source
            .list_courses()
            .await
            .map_err(|e| AppError::coursework(format!("Failed to list courses: {:#}", e)))?;

        for course in &courses {
            self.db.upsert_course(course).await?;
            match self.source.list_topics(&course.id).await {
                Ok(topics) => {
                    for topic in &topics {
                        self.db.upsert_category(topic).await?;
                    }
                }
                Err(e) => warn!("Failed to fetch topics for course {}: {:#}", course.id, e),
            }
        }

        info!("Synced {} courses", courses.len());
        Ok(())
    }

    async fn sync_course(&self, course: &Course, now: DateTime<Utc>, stats: &mut SyncStats) -> AppResult<()> {
        info!("Processing course: {}", course.name);

        let categories = self.db.get_categories(&course.id).await?;
        let enabled: HashSet<&str> = categories
            .iter()
            .filter(|category| category.enabled)
            .map(|category| category.id.as_str())
            .collect();

        if enabled.is_empty() && !course.sync_without_categories {
            warn!(
                "Course '{}' has no enabled categories (enable sync without categories to sync all)",
                course.name
            );
            return Ok(());
        }

        let items = match self.source.list_coursework(&course.id).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Failed to fetch coursework for course {}: {:#}", course.id, e);
                return Ok(());
            }
        };

        for item in &items {
            let Some(due_at) = item.due_at else {
                debug!("Ignoring '{}': no due date", item.title);
                continue;
            };

            if !course.sync_without_categories {
                if let Some(category_id) = item.category_id.as_deref() {
                    if !enabled.contains(category_id) {
                        debug!("Ignoring '{}': category {} not enabled", item.title, category_id);
                        continue;
                    }
                }
            }

            stats.assignments_processed += 1;
            self.reconcile(course, &categories, item, due_at, now, stats).await?;
        }

        Ok(())
    }

    async fn reconcile(
        &self,
        course: &Course,
        categories: &[Category],
        item: &RemoteCoursework,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
        stats: &mut SyncStats,
    ) -> AppResult<()> {
        match self.db.get_assignment(&item.id).await? {
            None => self.handle_new(course, categories, item, due_at, now, stats).await,
            Some(stored) if stored.is_dead => {
                debug!("Skipping dead assignment '{}'", stored.title);
                Ok(())
            }
            Some(stored) => {
                self.handle_existing(course, categories, stored, item, due_at, now, stats)
                    .await
            }
        }
    }

    async fn handle_new(
        &self,
        course: &Course,
        categories: &[Category],
        item: &RemoteCoursework,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
        stats: &mut SyncStats,
    ) -> AppResult<()> {
        if now > due_at {
            debug!("Skipping past assignment '{}'", item.title);
            return Ok(());
        }

        let category_name = category_name(categories, item.category_id.as_deref());
        let fresh = Assignment::first_seen(item, due_at, category_name, now);
        let calendar_name = course.calendar_name();

        // Events left behind by an earlier run that died before saving.
        let strays =
            calendar::remove_presence(self.calendar.as_ref(), calendar_name, None, &fresh.fingerprint).await;
        if strays > 0 {
            info!("Removed {} stray event(s) for '{}'", strays, fresh.title);
        }

        let primary_uid = new_event_uid();
        let alarms = self.publish(course, &fresh, primary_uid.clone(), now).await?;

        let assignment = fresh.apply(AssignmentPatch::new().event_uid(primary_uid), now)?;
        self.db.save_assignment(&assignment).await?;
        self.db.replace_alarms(&assignment.id, &alarms).await?;

        stats.created += 1;
        info!("New: '{}' with {} alarm(s)", assignment.title, alarms.len());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_existing(
        &self,
        course: &Course,
        categories: &[Category],
        stored: Assignment,
        item: &RemoteCoursework,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
        stats: &mut SyncStats,
    ) -> AppResult<()> {
        // Looked up once; the expiry check below reuses it.
        let status = match self.source.submission_status(&course.id, &stored.id).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Submission lookup for '{}' failed, assuming not submitted: {:#}", stored.title, e);
                SubmissionStatus::NotSubmitted
            }
        };

        if status.is_submitted() {
            let dead = stored.apply(
                AssignmentPatch::new()
                    .submission_status(status)
                    .mark_dead()
                    .last_checked(now),
                now,
            )?;
            self.cancel(course, &dead).await?;
            stats.cancelled += 1;
            info!("Submitted: '{}'", dead.title);
            return Ok(());
        }

        if now > due_at {
            let mut patch = AssignmentPatch::new().mark_dead().last_checked(now);
            if !stored.submission_checked_post_deadline {
                patch = patch.mark_checked_post_deadline().submission_status(status);
                info!(
                    "Past deadline: '{}' (final status {})",
                    stored.title,
                    status.as_str()
                );
            }
            let dead = stored.apply(patch, now)?;
            self.cancel(course, &dead).await?;
            stats.cancelled += 1;
            return Ok(());
        }

        let category_changed = item.category_id != stored.category_id;

        if due_at > stored.last_seen_due_at {
            let mut patch = AssignmentPatch::new()
                .extend_deadline(due_at)
                .details(item.title.clone(), item.description.clone())
                .last_checked(now);
            if category_changed {
                patch = patch.category(
                    item.category_id.clone(),
                    category_name(categories, item.category_id.as_deref()),
                );
            }
            let extended = stored.apply(patch, now)?;
            self.rebuild(course, extended, now).await?;
            stats.updated += 1;
            info!(
                "Deadline extended: '{}' now due {}",
                item.title,
                due_at.with_timezone(&self.settings.timezone).format("%Y-%m-%d %H:%M")
            );
            return Ok(());
        }

        if category_changed {
            let recategorised = stored.apply(
                AssignmentPatch::new()
                    .category(
                        item.category_id.clone(),
                        category_name(categories, item.category_id.as_deref()),
                    )
                    .details(item.title.clone(), item.description.clone())
                    .last_checked(now),
                now,
            )?;
            self.rebuild(course, recategorised, now).await?;
            stats.updated += 1;
            info!("Category changed: '{}'", item.title);
            return Ok(());
        }

        debug!("Unchanged: '{}'", stored.title);
        Ok(())
    }

    /// Builds the assignment's events under `primary_uid` and writes them.
    /// Returns the alarm rows that belong to them.
    async fn publish(
        &self,
        course: &Course,
        assignment: &Assignment,
        primary_uid: String,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<AlarmRecord>> {
        let (events, alarms) = self.event_set(course, assignment, primary_uid, now);
        calendar::publish(self.calendar.as_ref(), course.calendar_name(), &events)
            .await
            .map_err(|e| {
                AppError::calendar(format!("Failed to create events for '{}': {:#}", assignment.title, e))
            })?;
        Ok(alarms)
    }

    /// Replaces the assignment's events and alarms to match `assignment`,
    /// then persists it.
    async fn rebuild(&self, course: &Course, assignment: Assignment, now: DateTime<Utc>) -> AppResult<()> {
        let calendar_name = course.calendar_name();
        let primary_uid = match assignment.event_uid.clone() {
            Some(uid) => uid,
            None => calendar::recover_primary_uid(self.calendar.as_ref(), calendar_name, &assignment.fingerprint)
                .await
                .unwrap_or_else(new_event_uid),
        };

        let (events, alarms) = self.event_set(course, &assignment, primary_uid.clone(), now);
        calendar::replace_events(self.calendar.as_ref(), calendar_name, &events, &assignment.fingerprint)
            .await
            .map_err(|e| {
                AppError::calendar(format!("Failed to rebuild events for '{}': {:#}", assignment.title, e))
            })?;

        let assignment = if assignment.event_uid.as_deref() == Some(primary_uid.as_str()) {
            assignment
        } else {
            assignment.apply(AssignmentPatch::new().event_uid(primary_uid), now)?
        };
        self.db.save_assignment(&assignment).await?;
        self.db.replace_alarms(&assignment.id, &alarms).await?;
        Ok(())
    }

    /// Persists a dead record and takes its events and alarms away. The
    /// record itself is kept.
    async fn cancel(&self, course: &Course, dead: &Assignment) -> AppResult<()> {
        self.db.save_assignment(dead).await?;

        let removed = calendar::remove_presence(
            self.calendar.as_ref(),
            course.calendar_name(),
            dead.event_uid.as_deref(),
            &dead.fingerprint,
        )
        .await;
        let alarms = self.db.delete_alarms(&dead.id).await?;
        debug!(
            "Cancelled '{}': {} event(s), {} alarm(s) removed",
            dead.title, removed, alarms
        );
        Ok(())
    }

    fn event_set(
        &self,
        course: &Course,
        assignment: &Assignment,
        primary_uid: String,
        now: DateTime<Utc>,
    ) -> (calendar::EventSet, Vec<AlarmRecord>) {
        let tz = self.settings.timezone;
        let deadline = assignment.due_at.with_timezone(&tz);
        let scheduled = compute_alarms(
            deadline,
            now.with_timezone(&tz),
            &self.settings.alarm_intervals,
            self.settings.window_start_hour,
        );

        let title = reminder_title(assignment.category_name.as_deref(), &assignment.title, &course.name);
        let description = event_description(&assignment.fingerprint, &assignment.title);
        let events = build_event_set(primary_uid, &title, &description, deadline, &scheduled);
        let alarms = scheduled
            .iter()
            .map(|alarm| AlarmRecord::scheduled(&assignment.id, alarm))
            .collect();
        (events, alarms)
    }
}

fn category_name(categories: &[Category], category_id: Option<&str>) -> Option<String> {
    let category_id = category_id?;
    categories
        .iter()
        .find(|category| category.id == category_id)
        .map(|category| category.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::memory::MemoryCalendarStore;
    use crate::classroom::{MockCourseworkSource, RemoteCourse, RemoteTopic};
    use anyhow::anyhow;
    use chrono::{Duration, TimeZone};
    use chrono_tz::Asia::Kolkata;

    fn settings() -> SyncSettings {
        SyncSettings {
            timezone: Kolkata,
            alarm_intervals: vec![48, 24, 6, 2],
            window_start_hour: 7,
        }
    }

    fn now() -> DateTime<Utc> {
        Kolkata
            .with_ymd_and_hms(2025, 3, 8, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn due() -> DateTime<Utc> {
        Kolkata
            .with_ymd_and_hms(2025, 3, 10, 23, 59, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn coursework(due_at: Option<DateTime<Utc>>, category: Option<&str>) -> RemoteCoursework {
        RemoteCoursework {
            id: "cw-1".to_string(),
            course_id: "c-1".to_string(),
            title: "Lab 3".to_string(),
            description: None,
            category_id: category.map(str::to_string),
            due_at,
        }
    }

    fn source_with(items: Vec<RemoteCoursework>, status: SubmissionStatus) -> MockCourseworkSource {
        let mut source = MockCourseworkSource::new();
        source.expect_list_courses().returning(|| {
            Ok(vec![RemoteCourse {
                id: "c-1".to_string(),
                name: "Physics".to_string(),
                section: None,
                description: None,
            }])
        });
        source.expect_list_topics().returning(|_| {
            Ok(vec![RemoteTopic {
                id: "t-1".to_string(),
                course_id: "c-1".to_string(),
                name: "Labs".to_string(),
            }])
        });
        source
            .expect_list_coursework()
            .returning(move |_| Ok(items.clone()));
        source
            .expect_submission_status()
            .returning(move |_, _| Ok(status));
        source
    }

    async fn enabled_db() -> Database {
        let db = Database::in_memory().await.unwrap();
        db.upsert_course(&RemoteCourse {
            id: "c-1".to_string(),
            name: "Physics".to_string(),
            section: None,
            description: None,
        })
        .await
        .unwrap();
        db.set_course_enabled("c-1", true).await.unwrap();
        db.upsert_category(&RemoteTopic {
            id: "t-1".to_string(),
            course_id: "c-1".to_string(),
            name: "Labs".to_string(),
        })
        .await
        .unwrap();
        db.set_category_enabled("t-1", true).await.unwrap();
        db
    }

    fn engine(db: &Database, source: MockCourseworkSource, store: Arc<MemoryCalendarStore>) -> SyncEngine {
        SyncEngine::new(db.clone(), Arc::new(source), store, settings())
    }

    #[test]
    fn test_reminder_title() {
        assert_eq!(
            reminder_title(Some("Labs"), "Lab 3", "Physics"),
            "[LABS] Lab 3 – Physics"
        );
        assert_eq!(
            reminder_title(None, "Essay", "History"),
            "[GENERAL] Essay – History"
        );
    }

    #[tokio::test]
    async fn test_new_assignment_creates_events_and_alarms() {
        let db = enabled_db().await;
        let store = Arc::new(MemoryCalendarStore::new());
        let source = source_with(vec![coursework(Some(due()), Some("t-1"))], SubmissionStatus::NotSubmitted);

        let stats = engine(&db, source, store.clone()).run(now()).await.unwrap();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.assignments_processed, 1);

        let stored = db.get_assignment("cw-1").await.unwrap().unwrap();
        assert_eq!(stored.category_name.as_deref(), Some("Labs"));
        let primary = store.event("Physics", stored.event_uid.as_deref().unwrap()).unwrap();
        assert_eq!(primary.summary, "[LABS] Lab 3 – Physics");
        assert_eq!(store.events("Physics").len(), 3);
        assert_eq!(db.get_alarms("cw-1").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_items_without_due_date_or_disabled_category_are_ignored() {
        let db = enabled_db().await;
        let store = Arc::new(MemoryCalendarStore::new());
        let mut other = coursework(Some(due()), Some("t-9"));
        other.id = "cw-2".to_string();
        let source = source_with(
            vec![coursework(None, Some("t-1")), other],
            SubmissionStatus::NotSubmitted,
        );

        let stats = engine(&db, source, store.clone()).run(now()).await.unwrap();
        assert_eq!(stats.assignments_processed, 0);
        assert_eq!(store.total_events(), 0);
        assert!(db.get_assignments().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_past_due_new_assignment_is_not_recorded() {
        let db = enabled_db().await;
        let store = Arc::new(MemoryCalendarStore::new());
        let source = source_with(
            vec![coursework(Some(now() - Duration::hours(1)), Some("t-1"))],
            SubmissionStatus::NotSubmitted,
        );

        let stats = engine(&db, source, store.clone()).run(now()).await.unwrap();
        assert_eq!(stats.created, 0);
        assert!(db.get_assignment("cw-1").await.unwrap().is_none());
        assert_eq!(store.total_events(), 0);
    }

    #[tokio::test]
    async fn test_status_lookup_error_counts_as_not_submitted() {
        let db = enabled_db().await;
        let store = Arc::new(MemoryCalendarStore::new());
        let items = vec![coursework(Some(due()), Some("t-1"))];

        let first = source_with(items.clone(), SubmissionStatus::NotSubmitted);
        engine(&db, first, store.clone()).run(now()).await.unwrap();

        let mut failing = MockCourseworkSource::new();
        failing.expect_list_courses().returning(|| Ok(vec![]));
        failing
            .expect_list_coursework()
            .returning(move |_| Ok(items.clone()));
        failing
            .expect_submission_status()
            .times(1)
            .returning(|_, _| Err(anyhow!("HTTP 500")));

        let stats = engine(&db, failing, store.clone()).run(now()).await.unwrap();
        assert!(stats.is_quiet());
        assert!(!db.get_assignment("cw-1").await.unwrap().unwrap().is_dead);
    }

    #[tokio::test]
    async fn test_course_listing_failure_aborts_run() {
        let db = enabled_db().await;
        let mut source = MockCourseworkSource::new();
        source
            .expect_list_courses()
            .returning(|| Err(anyhow!("invalid_grant")));

        let result = engine(&db, source, Arc::new(MemoryCalendarStore::new()))
            .run(now())
            .await;
        assert!(matches!(result, Err(AppError::Source(message)) if message.contains("invalid_grant")));
    }

    #[tokio::test]
    async fn test_coursework_fetch_failure_skips_course() {
        let db = enabled_db().await;
        let mut source = MockCourseworkSource::new();
        source.expect_list_courses().returning(|| Ok(vec![]));
        source
            .expect_list_coursework()
            .returning(|_| Err(anyhow!("HTTP 403")));

        let stats = engine(&db, source, Arc::new(MemoryCalendarStore::new()))
            .run(now())
            .await
            .unwrap();
        assert_eq!(stats, SyncStats::default());
    }

    #[tokio::test]
    async fn test_calendar_write_failure_is_fatal_and_saves_nothing() {
        let db = enabled_db().await;
        let store = Arc::new(MemoryCalendarStore::new());
        store.set_fail_puts(true);
        let source = source_with(vec![coursework(Some(due()), Some("t-1"))], SubmissionStatus::NotSubmitted);

        let result = engine(&db, source, store).run(now()).await;
        assert!(matches!(result, Err(AppError::Calendar(_))));
        assert!(db.get_assignment("cw-1").await.unwrap().is_none());
    }
}
