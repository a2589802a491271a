//! Alarm scheduling
//!
//! Turns a deadline into the notification instants that should fire before
//! it. Candidates at or before "now" are dropped, and anything landing before
//! the daily notification window opens is pushed to the window start on the
//! same day. The window end is configuration only: late-night alarms keep
//! their natural time.

use chrono::{DateTime, Duration, TimeZone, Timelike};
use chrono_tz::Tz;

/// A notification instant together with the lead interval that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledAlarm {
    pub lead_hours: u32,
    pub at: DateTime<Tz>,
}

impl ScheduledAlarm {
    /// Alarm kind used as record key and in satellite titles, e.g. `48h`.
    pub fn kind(&self) -> String {
        format!("{}h", self.lead_hours)
    }
}

/// Computes the alarms for `due`, ordered from furthest in advance to
/// nearest the deadline. An empty result means nothing is left to schedule.
pub fn compute_alarms(
    due: DateTime<Tz>,
    now: DateTime<Tz>,
    intervals_hours: &[u32],
    window_start_hour: u32,
) -> Vec<ScheduledAlarm> {
    let mut leads: Vec<u32> = intervals_hours.to_vec();
    leads.sort_unstable_by(|a, b| b.cmp(a));
    leads.dedup();

    leads
        .into_iter()
        .filter_map(|lead_hours| {
            let candidate = due - Duration::hours(i64::from(lead_hours));
            if candidate <= now {
                return None;
            }
            Some(ScheduledAlarm {
                lead_hours,
                at: apply_time_window(candidate, window_start_hour),
            })
        })
        .collect()
}

/// Shifts `at` forward to `start_hour:00:00` on its own local day when it
/// falls before the window opens.
pub fn apply_time_window(at: DateTime<Tz>, start_hour: u32) -> DateTime<Tz> {
    if at.hour() >= start_hour {
        return at;
    }

    let Some(opening) = at.date_naive().and_hms_opt(start_hour, 0, 0) else {
        return at;
    };

    // A DST gap can swallow the opening hour; keep the natural time then.
    at.timezone()
        .from_local_datetime(&opening)
        .earliest()
        .unwrap_or(at)
}
