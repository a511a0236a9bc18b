//! Rendering structural events into wire-format VEVENT blocks.

use icalendar::{Calendar, Component, EventLike, Property};
use uuid::Uuid;

use crate::document::ComponentBlock;
use crate::event::Event;
use crate::ics::IcsError;

/// Render one event into its VEVENT block, de-dup key attached.
///
/// Start and end are emitted with a TZID parameter carrying the source
/// timezone; no conversion happens here.
pub fn event_block(event: &Event) -> Result<ComponentBlock, IcsError> {
    let mut vevent = icalendar::Event::new();
    vevent.uid(&format!("{}@tablefeed", Uuid::new_v4()));
    vevent.summary(&event.title);

    // DTSTAMP is required by RFC 5545.
    let dtstamp = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
    vevent.add_property("DTSTAMP", &dtstamp);

    add_zoned_property(&mut vevent, "DTSTART", &event.start);
    add_zoned_property(&mut vevent, "DTEND", &event.end);

    if let Some(ref location) = event.location {
        vevent.location(location);
    }
    if let Some(ref description) = event.description {
        vevent.description(description);
    }

    let mut calendar = Calendar::new();
    calendar.push(vevent.done());

    let raw = extract_vevent(&calendar.done().to_string()).ok_or(IcsError::MissingEventBlock)?;

    Ok(ComponentBlock {
        name: "VEVENT".to_string(),
        raw,
        key: Some(event.key()),
    })
}

fn add_zoned_property(
    vevent: &mut icalendar::Event,
    name: &str,
    instant: &chrono::DateTime<chrono_tz::Tz>,
) {
    let mut prop = Property::new(name, instant.format("%Y%m%dT%H%M%S").to_string());
    prop.add_parameter("TZID", instant.timezone().name());
    vevent.append_property(prop);
}

/// Pull the VEVENT block back out of the rendered calendar. The
/// icalendar crate only emits whole VCALENDARs; the document model
/// stores per-component blocks.
fn extract_vevent(ics: &str) -> Option<String> {
    let mut lines: Vec<&str> = Vec::new();
    let mut inside = false;
    for line in ics.lines() {
        let line = line.trim_end_matches('\r');
        if line == "BEGIN:VEVENT" {
            inside = true;
        }
        if inside {
            lines.push(line);
        }
        if line == "END:VEVENT" {
            return Some(lines.join("\r\n"));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ics::parse::event_key_for_block;
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;

    fn sample_event() -> Event {
        Event {
            title: "Mathematik".to_string(),
            start: Berlin.with_ymd_and_hms(2025, 10, 6, 9, 0, 0).unwrap(),
            end: Berlin.with_ymd_and_hms(2025, 10, 6, 12, 15, 0).unwrap(),
            location: Some("Raum 127".to_string()),
            description: Some("Kurs: TINF24".to_string()),
        }
    }

    #[test]
    fn renders_a_single_vevent_block() {
        let block = event_block(&sample_event()).unwrap();
        assert!(block.raw.starts_with("BEGIN:VEVENT"));
        assert!(block.raw.ends_with("END:VEVENT"));
        assert!(block.raw.contains("SUMMARY:Mathematik"));
        assert!(block.raw.contains("LOCATION:Raum 127"));
        assert!(block.raw.contains("DESCRIPTION:Kurs: TINF24"));
        assert!(block.raw.contains("DTSTART;TZID=Europe/Berlin:20251006T090000"));
        assert!(block.raw.contains("DTEND;TZID=Europe/Berlin:20251006T121500"));
    }

    #[test]
    fn rendered_block_reparses_to_the_same_key() {
        let event = sample_event();
        let block = event_block(&event).unwrap();
        let reparsed = event_key_for_block(&block.raw).unwrap();
        assert_eq!(reparsed, event.key());
    }
}
