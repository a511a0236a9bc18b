//! Tolerant calendar document parsing.
//!
//! The reader never fails: junk input, a headerless fragment left by a
//! half-written cache file, or a full VCALENDAR all produce a document
//! (with a synthesized default header when none is present). Component
//! blocks are captured verbatim; only the de-duplication key is parsed
//! out of VEVENT blocks, using the icalendar crate's parser.

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    parser::{read_calendar, unfold},
    CalendarDateTime, DatePerhapsTime,
};

use crate::document::{CalendarDocument, ComponentBlock};
use crate::event::EventKey;

/// Parse calendar text into a document. Accepts a full VCALENDAR or a
/// headerless fragment; always returns a document.
pub fn parse_document(input: &str) -> CalendarDocument {
    let mut doc = CalendarDocument::empty();

    // Name of the top-level component being collected, plus the open
    // BEGIN markers inside it (VEVENT blocks may nest VALARMs).
    let mut block_name: Option<String> = None;
    let mut nested: Vec<String> = Vec::new();
    let mut lines: Vec<String> = Vec::new();

    for raw_line in input.lines() {
        let line = raw_line.trim_end_matches('\r');
        let upper = line.trim().to_ascii_uppercase();

        match &block_name {
            None => {
                if upper == "BEGIN:VCALENDAR" || upper == "END:VCALENDAR" {
                    continue;
                }
                if let Some(name) = upper.strip_prefix("BEGIN:") {
                    block_name = Some(name.to_string());
                    nested.clear();
                    lines.clear();
                    lines.push(line.to_string());
                } else if let Some(value) = header_value(line, "PRODID") {
                    doc.prodid = value;
                } else if let Some(value) = header_value(line, "VERSION") {
                    doc.version = value;
                }
                // Other header lines (CALSCALE, METHOD, X-…) are dropped.
            }
            Some(name) => {
                lines.push(line.to_string());
                if let Some(inner) = upper.strip_prefix("BEGIN:") {
                    nested.push(inner.to_string());
                } else if let Some(ended) = upper.strip_prefix("END:") {
                    if nested.last().map(String::as_str) == Some(ended) {
                        nested.pop();
                    } else if ended == name.as_str() {
                        let raw = lines.join("\r\n");
                        let key = if name == "VEVENT" {
                            event_key_for_block(&raw)
                        } else {
                            None
                        };
                        doc.push_block(ComponentBlock {
                            name: name.clone(),
                            raw,
                            key,
                        });
                        block_name = None;
                    }
                }
            }
        }
    }

    // A block left open at EOF is a truncated write; drop it.
    doc
}

/// Extract the `(title, start, end)` identity from one VEVENT block.
/// Returns None when the block cannot be parsed; such events are still
/// carried, they just never participate in de-duplication.
pub(crate) fn event_key_for_block(raw: &str) -> Option<EventKey> {
    let wrapped = format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:KEY\r\n{raw}\r\nEND:VCALENDAR\r\n");
    let unfolded = unfold(&wrapped);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let title = vevent.find_prop("SUMMARY").map(|p| p.val.to_string())?;
    let start = normalize_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let end = normalize_time(DatePerhapsTime::try_from(vevent.find_prop("DTEND")?).ok()?);

    Some(EventKey::new(title, start, end))
}

/// Render a parsed time to a canonical string: UTC wherever the zone is
/// known, so `20251006T070000Z` and `TZID=Europe/Berlin:…T090000`
/// identify the same instant.
fn normalize_time(dpt: DatePerhapsTime) -> String {
    match dpt {
        DatePerhapsTime::Date(d) => d.format("%Y%m%d").to_string(),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
            CalendarDateTime::Floating(naive) => naive.format("%Y%m%dT%H%M%S").to_string(),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                let utc = tzid
                    .parse::<Tz>()
                    .ok()
                    .and_then(|tz| tz.from_local_datetime(&date_time).earliest())
                    .map(|local| local.with_timezone(&Utc));
                match utc {
                    Some(utc) => utc.format("%Y%m%dT%H%M%SZ").to_string(),
                    // Unknown zone: keep it distinct rather than guessing.
                    None => format!("{}@{}", date_time.format("%Y%m%dT%H%M%S"), tzid),
                }
            }
        },
    }
}

fn header_value(line: &str, name: &str) -> Option<String> {
    let (prop, value) = line.split_once(':')?;
    if prop.trim().eq_ignore_ascii_case(name) {
        Some(value.trim().to_string())
    } else {
        None
    }
}
