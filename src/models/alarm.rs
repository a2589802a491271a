// file: src/models/alarm.rs
use crate::alarms::ScheduledAlarm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One notification instant scheduled for an active assignment, keyed by
/// (assignment_id, alarm_type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AlarmRecord {
    pub assignment_id: String,
    pub alarm_type: String,
    pub alarm_time: DateTime<Utc>,
}

impl AlarmRecord {
    pub fn scheduled(assignment_id: &str, alarm: &ScheduledAlarm) -> Self {
        Self {
            assignment_id: assignment_id.to_string(),
            alarm_type: alarm.kind(),
            alarm_time: alarm.at.with_timezone(&Utc),
        }
    }
}
