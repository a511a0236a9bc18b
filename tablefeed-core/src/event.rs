//! The event model for scraped timetable rows.
//!
//! Events constructed here always carry the single configured source
//! timezone; no conversion happens anywhere else in the service.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Timestamp format the source table renders its cells in.
pub const SOURCE_DATETIME_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Title prefixes marking rows that are absences rather than lessons.
/// Matched case-insensitively; such rows are filtered out upstream of
/// event construction and are not errors.
const ABSENCE_PREFIXES: &[&str] = &["abwesenheit", "absence"];

/// One row extracted from the source table: cell texts in column order.
pub type RawRow = Vec<String>;

/// Why a single row could not be turned into an event.
#[derive(Error, Debug)]
pub enum MalformedEvent {
    #[error("row has fewer than three populated fields")]
    MissingFields,

    #[error("unparseable timestamp: {0:?}")]
    BadTimestamp(String),

    #[error("timestamp {1:?} is not a valid local time in {0}")]
    BadLocalTime(Tz, String),

    #[error("event {0:?} ends before it starts")]
    EndBeforeStart(String),
}

/// A single calendar event, immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub title: String,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub location: Option<String>,
    pub description: Option<String>,
}

impl Event {
    /// Build an event from a raw table row, interpreting timestamps in `tz`.
    ///
    /// Column mapping follows the source table: 0 = title, 1 = start,
    /// 2 = end, 3 = course, 5 = location.
    pub fn from_row(row: &RawRow, tz: Tz) -> Result<Self, MalformedEvent> {
        let title = populated_cell(row, 0)?;
        let start_raw = populated_cell(row, 1)?;
        let end_raw = populated_cell(row, 2)?;

        let start = parse_source_timestamp(start_raw, tz)?;
        let end = parse_source_timestamp(end_raw, tz)?;
        if end < start {
            return Err(MalformedEvent::EndBeforeStart(title.to_string()));
        }

        let course = row.get(3).map(|s| s.trim()).filter(|s| !s.is_empty());
        let location = row
            .get(5)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Event {
            title: title.to_string(),
            start,
            end,
            location,
            description: course.map(|c| format!("Kurs: {c}")),
        })
    }

    /// Whether a row title marks an absence entry.
    pub fn is_absence(title: &str) -> bool {
        let lowered = title.trim().to_lowercase();
        ABSENCE_PREFIXES.iter().any(|p| lowered.starts_with(p))
    }

    /// Identity used for cross-source de-duplication.
    pub fn key(&self) -> EventKey {
        EventKey {
            title: self.title.clone(),
            start: canonical_utc(&self.start),
            end: canonical_utc(&self.end),
        }
    }
}

/// De-duplication identity: `(title, start, end)` with timestamps
/// normalized to a canonical UTC rendering, so the same instant
/// expressed in different zones compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub title: String,
    pub start: String,
    pub end: String,
}

impl EventKey {
    pub fn new(title: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        EventKey {
            title: title.into(),
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Canonical UTC rendering used by [`EventKey`].
pub fn canonical_utc(instant: &DateTime<Tz>) -> String {
    instant
        .with_timezone(&Utc)
        .format("%Y%m%dT%H%M%SZ")
        .to_string()
}

fn populated_cell(row: &RawRow, index: usize) -> Result<&str, MalformedEvent> {
    row.get(index)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or(MalformedEvent::MissingFields)
}

fn parse_source_timestamp(raw: &str, tz: Tz) -> Result<DateTime<Tz>, MalformedEvent> {
    let naive = NaiveDateTime::parse_from_str(raw, SOURCE_DATETIME_FORMAT)
        .map_err(|_| MalformedEvent::BadTimestamp(raw.to_string()))?;
    // DST gaps make some local times nonexistent; ambiguous ones take
    // the earlier mapping.
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| MalformedEvent::BadLocalTime(tz, raw.to_string()))
}
