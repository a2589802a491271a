//! Calendar event mapper
//!
//! A calendar event can carry at most two notification triggers, so a
//! deadline with more alarms is spread over several physical events: the
//! primary event sits at the deadline with the two nearest alarms, and every
//! earlier alarm gets a satellite event of its own that fires at start.

use crate::alarms::ScheduledAlarm;
use chrono::{DateTime, Duration};
use chrono_tz::Tz;
use uuid::Uuid;

pub const MAX_TRIGGERS_PER_EVENT: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalEvent {
    pub uid: String,
    pub summary: String,
    pub description: String,
    /// Start and end; events are zero-length.
    pub start: DateTime<Tz>,
    /// Trigger offsets relative to `start`, negative meaning before.
    pub triggers: Vec<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventSet {
    pub primary: PhysicalEvent,
    pub satellites: Vec<PhysicalEvent>,
}

impl EventSet {
    pub fn iter(&self) -> impl Iterator<Item = &PhysicalEvent> {
        std::iter::once(&self.primary).chain(self.satellites.iter())
    }
}

pub fn new_event_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Description shared by every event of one assignment.
pub fn event_description(fingerprint: &str, title: &str) -> String {
    format!("{} | {}", fingerprint, title)
}

/// Lays `alarms` (furthest first) out over a primary event at `deadline` and
/// as many satellites as needed.
///
/// With no alarms the primary still marks the deadline, without triggers. A
/// trigger can point after the deadline when the notification window moved an
/// early-morning alarm past it; it is kept as a positive offset.
pub fn build_event_set(
    primary_uid: String,
    title: &str,
    description: &str,
    deadline: DateTime<Tz>,
    alarms: &[ScheduledAlarm],
) -> EventSet {
    let split = alarms.len().saturating_sub(MAX_TRIGGERS_PER_EVENT);
    let (early, near) = alarms.split_at(split);

    let primary = PhysicalEvent {
        uid: primary_uid,
        summary: title.to_string(),
        description: description.to_string(),
        start: deadline,
        triggers: near.iter().map(|alarm| alarm.at - deadline).collect(),
    };

    let satellites = early
        .iter()
        .map(|alarm| PhysicalEvent {
            uid: new_event_uid(),
            summary: format!("{} [{} Alert]", title, alarm.kind()),
            description: description.to_string(),
            start: alarm.at,
            triggers: vec![Duration::zero()],
        })
        .collect();

    EventSet { primary, satellites }
}
