// Calendar integration module
// Store seam, event mapping and presence management for assignment deadlines

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod caldav;
pub mod ics;
pub mod mapper;
pub mod memory;

pub use mapper::{build_event_set, event_description, new_event_uid, EventSet, PhysicalEvent};

/// An event as read back from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub uid: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Creates or replaces `event`, creating the named calendar first if it
    /// does not exist yet.
    async fn put_event(&self, calendar: &str, event: &PhysicalEvent) -> Result<()>;

    /// Removes an event. An event that is already gone is not an error.
    async fn delete_event(&self, calendar: &str, uid: &str) -> Result<()>;

    /// Last-resort lookup of every event whose description contains
    /// `needle`. Scans the whole calendar, so it is O(events) and only as
    /// reliable as the server's content round trip.
    async fn find_by_content(&self, calendar: &str, needle: &str) -> Result<Vec<StoredEvent>>;
}

/// Writes every event of `events`, primary first. Stops at the first failure.
pub async fn publish(store: &dyn CalendarStore, calendar: &str, events: &EventSet) -> Result<()> {
    for event in events.iter() {
        store.put_event(calendar, event).await?;
    }
    log::debug!(
        "Published {} event(s) to '{}' for {}",
        events.iter().count(),
        calendar,
        events.primary.uid
    );
    Ok(())
}

/// Finds the primary event of an assignment whose stored reference was lost:
/// of the events carrying `fingerprint`, the one starting last sits at the
/// deadline.
pub async fn recover_primary_uid(
    store: &dyn CalendarStore,
    calendar: &str,
    fingerprint: &str,
) -> Option<String> {
    match store.find_by_content(calendar, fingerprint).await {
        Ok(found) => found
            .into_iter()
            .max_by_key(|event| event.start)
            .map(|event| event.uid),
        Err(e) => {
            log::warn!("Event lookup in '{}' failed: {}", calendar, e);
            None
        }
    }
}

/// Removes the primary event and every satellite carrying `fingerprint`.
/// Failures are logged and skipped; returns how many deletes succeeded.
pub async fn remove_presence(
    store: &dyn CalendarStore,
    calendar: &str,
    primary_uid: Option<&str>,
    fingerprint: &str,
) -> usize {
    let mut uids: Vec<String> = primary_uid.map(str::to_string).into_iter().collect();

    match store.find_by_content(calendar, fingerprint).await {
        Ok(found) => {
            for event in found {
                if !uids.contains(&event.uid) {
                    uids.push(event.uid);
                }
            }
        }
        Err(e) => log::warn!("Event lookup in '{}' failed: {}", calendar, e),
    }

    let mut removed = 0;
    for uid in &uids {
        match store.delete_event(calendar, uid).await {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Failed to delete event {} from '{}': {}", uid, calendar, e),
        }
    }
    removed
}

/// Delete-then-create under the same primary uid.
pub async fn replace_events(
    store: &dyn CalendarStore,
    calendar: &str,
    events: &EventSet,
    fingerprint: &str,
) -> Result<()> {
    remove_presence(store, calendar, Some(&events.primary.uid), fingerprint).await;
    publish(store, calendar, events).await
}
