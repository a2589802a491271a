#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Asia::Kolkata;
use duesync::calendar::memory::MemoryCalendarStore;
use duesync::classroom::{CourseworkSource, RemoteCourse, RemoteCoursework, RemoteTopic};
use duesync::notify::AlertSender;
use duesync::{Database, SubmissionStatus, SyncEngine, SyncSettings};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const COURSE_ID: &str = "c-1";
pub const COURSE_NAME: &str = "Physics";

/// 2025-03-?? at `h:min` India Standard Time.
pub fn ist(day: u32, h: u32, min: u32) -> DateTime<Utc> {
    Kolkata
        .with_ymd_and_hms(2025, 3, day, h, min, 0)
        .unwrap()
        .with_timezone(&Utc)
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        timezone: Kolkata,
        alarm_intervals: vec![48, 24, 6, 2],
        window_start_hour: 7,
    }
}

#[derive(Default)]
struct SourceState {
    courses: Vec<RemoteCourse>,
    topics: Vec<RemoteTopic>,
    coursework: Vec<RemoteCoursework>,
    statuses: HashMap<String, SubmissionStatus>,
    failing_course_listings: usize,
}

/// Scriptable stand-in for the classroom service.
#[derive(Default)]
pub struct FakeSource {
    state: Mutex<SourceState>,
    status_lookups: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// One course with one topic, `t-labs` ("Labs").
    pub fn physics() -> Self {
        let source = Self::new();
        source.add_course(COURSE_ID, COURSE_NAME);
        source.add_topic(COURSE_ID, "t-labs", "Labs");
        source
    }

    pub fn add_course(&self, id: &str, name: &str) {
        self.state.lock().unwrap().courses.push(RemoteCourse {
            id: id.to_string(),
            name: name.to_string(),
            section: None,
            description: None,
        });
    }

    pub fn add_topic(&self, course_id: &str, id: &str, name: &str) {
        self.state.lock().unwrap().topics.push(RemoteTopic {
            id: id.to_string(),
            course_id: course_id.to_string(),
            name: name.to_string(),
        });
    }

    /// Adds or replaces an item by id.
    pub fn put_coursework(&self, id: &str, title: &str, topic: Option<&str>, due_at: Option<DateTime<Utc>>) {
        let item = RemoteCoursework {
            id: id.to_string(),
            course_id: COURSE_ID.to_string(),
            title: title.to_string(),
            description: None,
            category_id: topic.map(str::to_string),
            due_at,
        };
        let mut state = self.state.lock().unwrap();
        state.coursework.retain(|existing| existing.id != id);
        state.coursework.push(item);
    }

    pub fn set_due(&self, id: &str, due_at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        if let Some(item) = state.coursework.iter_mut().find(|item| item.id == id) {
            item.due_at = Some(due_at);
        }
    }

    pub fn set_topic(&self, id: &str, topic: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        if let Some(item) = state.coursework.iter_mut().find(|item| item.id == id) {
            item.category_id = topic.map(str::to_string);
        }
    }

    pub fn set_status(&self, id: &str, status: SubmissionStatus) {
        self.state.lock().unwrap().statuses.insert(id.to_string(), status);
    }

    /// Makes the next `count` course listings fail.
    pub fn fail_course_listings(&self, count: usize) {
        self.state.lock().unwrap().failing_course_listings = count;
    }

    pub fn status_lookups(&self) -> usize {
        self.status_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CourseworkSource for FakeSource {
    async fn list_courses(&self) -> Result<Vec<RemoteCourse>> {
        let mut state = self.state.lock().unwrap();
        if state.failing_course_listings > 0 {
            state.failing_course_listings -= 1;
            return Err(anyhow!("401 Unauthorized: invalid_grant"));
        }
        Ok(state.courses.clone())
    }

    async fn list_topics(&self, course_id: &str) -> Result<Vec<RemoteTopic>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .topics
            .iter()
            .filter(|topic| topic.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn list_coursework(&self, course_id: &str) -> Result<Vec<RemoteCoursework>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .coursework
            .iter()
            .filter(|item| item.course_id == course_id)
            .cloned()
            .collect())
    }

    async fn submission_status(&self, _course_id: &str, coursework_id: &str) -> Result<SubmissionStatus> {
        self.status_lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state
            .statuses
            .get(coursework_id)
            .copied()
            .unwrap_or(SubmissionStatus::NotSubmitted))
    }
}

/// Records every message instead of sending it.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingSender {
    pub fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(subject, _)| subject.clone())
            .collect()
    }
}

#[async_trait]
impl AlertSender for RecordingSender {
    async fn send(&self, subject: &str, html: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), html.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub db: Database,
    pub source: Arc<FakeSource>,
    pub calendar: Arc<MemoryCalendarStore>,
    pub engine: SyncEngine,
}

/// Engine over an in-memory database with the physics course and its
/// "Labs" topic enabled.
pub async fn harness() -> Harness {
    let db = Database::in_memory().await.unwrap();
    let source = Arc::new(FakeSource::physics());
    let calendar = Arc::new(MemoryCalendarStore::new());

    for course in source.list_courses().await.unwrap() {
        db.upsert_course(&course).await.unwrap();
    }
    for topic in source.list_topics(COURSE_ID).await.unwrap() {
        db.upsert_category(&topic).await.unwrap();
    }
    db.set_course_enabled(COURSE_ID, true).await.unwrap();
    db.set_category_enabled("t-labs", true).await.unwrap();

    let engine = SyncEngine::new(db.clone(), source.clone(), calendar.clone(), settings());
    Harness {
        db,
        source,
        calendar,
        engine,
    }
}
