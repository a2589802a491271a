// iCalendar serialization and parsing for stored events

use super::{PhysicalEvent, StoredEvent};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use icalendar::{
    Alarm, Calendar as IcsCalendar, CalendarDateTime, Component, Event as IcsEvent, EventLike,
    EventStatus,
};
use std::str::FromStr;

/// Renders one event as a complete VCALENDAR object, ready for a PUT.
pub fn to_ics(event: &PhysicalEvent) -> String {
    let start = CalendarDateTime::WithTimezone {
        date_time: event.start.naive_local(),
        tzid: event.start.timezone().name().to_string(),
    };

    let mut vevent = IcsEvent::new();
    vevent
        .uid(&event.uid)
        .summary(&event.summary)
        .description(&event.description)
        .starts(start.clone())
        .ends(start)
        .status(EventStatus::Confirmed);

    for trigger in &event.triggers {
        vevent.alarm(Alarm::display(&event.summary, *trigger));
    }

    let mut calendar = IcsCalendar::new();
    calendar.push(vevent.done());
    calendar.done().to_string()
}

/// Parses every VEVENT in `ics_data`. Events without a UID cannot be
/// addressed and are skipped.
pub fn parse_events(ics_data: &str) -> Result<Vec<StoredEvent>> {
    let calendar = IcsCalendar::from_str(ics_data)
        .map_err(|e| anyhow!("Failed to parse ICS data: {}", e))?;

    let mut events = Vec::new();
    for component in &calendar.components {
        let Some(ics_event) = component.as_event() else {
            continue;
        };
        let Some(uid) = ics_event.get_uid() else {
            log::debug!("Skipping event without UID");
            continue;
        };
        events.push(StoredEvent {
            uid: uid.to_string(),
            summary: ics_event.get_summary().map(str::to_string),
            description: ics_event.get_description().map(str::to_string),
            start: ics_event.get_start().as_ref().and_then(parse_ical_datetime),
        });
    }

    Ok(events)
}

/// Parse ICS datetime with proper timezone conversion
pub fn parse_ical_datetime(dt: &icalendar::DatePerhapsTime) -> Option<DateTime<Utc>> {
    match dt {
        icalendar::DatePerhapsTime::DateTime(dt) => match dt {
            icalendar::CalendarDateTime::Utc(dt) => Some(*dt),

            // Floating time (no timezone specified) - interpret as local system time
            icalendar::CalendarDateTime::Floating(naive_dt) => chrono::Local
                .from_local_datetime(naive_dt)
                .single()
                .map(|local| local.with_timezone(&Utc)),

            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                if let Ok(tz) = chrono_tz::Tz::from_str(tzid) {
                    tz.from_local_datetime(date_time)
                        .earliest()
                        .map(|zoned| zoned.with_timezone(&Utc))
                } else {
                    log::warn!("Unrecognized timezone '{}', treating as local time", tzid);
                    chrono::Local
                        .from_local_datetime(date_time)
                        .single()
                        .map(|local| local.with_timezone(&Utc))
                }
            }
        },
        icalendar::DatePerhapsTime::Date(date) => chrono::Local
            .with_ymd_and_hms(date.year(), date.month(), date.day(), 0, 0, 0)
            .single()
            .map(|local| local.with_timezone(&Utc)),
    }
}
