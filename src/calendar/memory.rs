// In-process calendar store
// Keeps events in memory; used by tests and dry runs

use super::{CalendarStore, PhysicalEvent, StoredEvent};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryCalendarStore {
    calendars: Mutex<HashMap<String, BTreeMap<String, PhysicalEvent>>>,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryCalendarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events of `calendar`, ordered by start.
    pub fn events(&self, calendar: &str) -> Vec<PhysicalEvent> {
        let calendars = self.lock();
        let mut events: Vec<PhysicalEvent> = calendars
            .get(calendar)
            .map(|events| events.values().cloned().collect())
            .unwrap_or_default();
        events.sort_by_key(|event| event.start);
        events
    }

    pub fn event(&self, calendar: &str, uid: &str) -> Option<PhysicalEvent> {
        self.lock().get(calendar).and_then(|events| events.get(uid).cloned())
    }

    pub fn calendar_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn total_events(&self) -> usize {
        self.lock().values().map(BTreeMap::len).sum()
    }

    /// Number of successful writes (puts plus deletes) so far.
    pub fn write_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, BTreeMap<String, PhysicalEvent>>> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.calendars.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl CalendarStore for MemoryCalendarStore {
    async fn put_event(&self, calendar: &str, event: &PhysicalEvent) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(anyhow!("PUT {} rejected", event.uid));
        }
        self.lock()
            .entry(calendar.to_string())
            .or_default()
            .insert(event.uid.clone(), event.clone());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_event(&self, calendar: &str, uid: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(anyhow!("DELETE {} rejected", uid));
        }
        let removed = self
            .lock()
            .get_mut(calendar)
            .and_then(|events| events.remove(uid));
        if removed.is_some() {
            self.deletes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn find_by_content(&self, calendar: &str, needle: &str) -> Result<Vec<StoredEvent>> {
        let calendars = self.lock();
        let Some(events) = calendars.get(calendar) else {
            return Ok(Vec::new());
        };

        Ok(events
            .values()
            .filter(|event| event.description.contains(needle))
            .map(|event| StoredEvent {
                uid: event.uid.clone(),
                summary: Some(event.summary.clone()),
                description: Some(event.description.clone()),
                start: Some(event.start.with_timezone(&Utc)),
            })
            .collect())
    }
}
