//! Feed document generation.

use chrono::{DateTime, Utc};
use icalendar::{Alarm, Calendar, Component, EventLike, Property, Trigger, ValueType};

use crate::constants::{
    ICAL_CALNAME, ICAL_METHOD, ICAL_PRODID, ICAL_REFRESH_INTERVAL, ICAL_SCALE, ICAL_VERSION,
};
use crate::error::{BirthcalError, BirthcalResult};
use crate::events::BirthdayEvent;

/// Encode birthday events into a complete VCALENDAR document.
///
/// All events share the same `dtstamp`. With no events the result is still
/// a valid calendar consisting of the header block only.
pub fn generate_feed(events: &[BirthdayEvent], dtstamp: DateTime<Utc>) -> BirthcalResult<String> {
    let mut cal = Calendar::new();

    cal.append_property(Property::new("X-WR-CALNAME", ICAL_CALNAME));
    cal.append_property(Property::new("METHOD", ICAL_METHOD));

    // RFC 7986 refresh hint for subscribing clients
    let mut refresh = Property::new("REFRESH-INTERVAL", ICAL_REFRESH_INTERVAL);
    refresh.append_parameter(ValueType::Duration);
    cal.append_property(refresh);

    let dtstamp = dtstamp.format("%Y%m%dT%H%M%SZ").to_string();

    for event in events {
        let mut ics_event = icalendar::Event::new();
        ics_event.uid(&event.uid);
        ics_event.summary(&event.summary);
        ics_event.add_property("DTSTAMP", &dtstamp);

        // VALUE=DATE keeps the birthday a floating all-day event
        let mut start = Property::new("DTSTART", event.date.format("%Y%m%d").to_string());
        start.append_parameter(ValueType::Date);
        ics_event.append_property(start);

        if let Some(ref alarm) = event.alarm {
            let mut valarm = Alarm::display(&alarm.description, Trigger::before_start(chrono::Duration::zero()));
            // The configured trigger is emitted verbatim
            valarm.add_property("TRIGGER", &alarm.trigger);
            ics_event.alarm(valarm);
        }

        cal.push(ics_event.done());
    }

    let cal = cal.done();
    let output = normalize_header(&cal.to_string());

    if !output.starts_with("BEGIN:VCALENDAR") || !output.trim_end().ends_with("END:VCALENDAR") {
        return Err(BirthcalError::IcsGenerate(
            "calendar document is not a VCALENDAR".into(),
        ));
    }

    Ok(output)
}

/// Clean up the icalendar crate's output
/// - Set our own VERSION, PRODID and CALSCALE values
/// - Remove DTSTAMP and UID inside VALARM sections (not required by RFC 5545)
fn normalize_header(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    let mut in_valarm = false;

    for line in ics.lines() {
        if line.starts_with("VERSION:") {
            result.push_str(&format!("VERSION:{ICAL_VERSION}\r\n"));
            continue;
        }

        if line.starts_with("PRODID:") {
            result.push_str(&format!("PRODID:{ICAL_PRODID}\r\n"));
            continue;
        }

        if line.starts_with("CALSCALE:") {
            result.push_str(&format!("CALSCALE:{ICAL_SCALE}\r\n"));
            continue;
        }

        if line == "BEGIN:VALARM" {
            in_valarm = true;
        } else if line == "END:VALARM" {
            in_valarm = false;
        }

        if in_valarm && (line.starts_with("DTSTAMP:") || line.starts_with("UID:")) {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}
