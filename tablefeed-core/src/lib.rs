//! Core engine for the tablefeed calendar service.
//!
//! This crate contains everything between the HTTP route layer and the
//! outside world:
//! - `event` / `document`: the calendar data model and its de-duplication rules
//! - `scrape` / `generate`: turning the source timetable page into the primary calendar
//! - `source` / `merge`: fetching external calendars and unioning them with the primary
//! - `cache`: file-backed artifacts with regenerate-or-serve-stale semantics
//! - `config`: the immutable service configuration, built once at startup

pub mod cache;
mod caldav;
pub mod config;
pub mod document;
pub mod event;
pub mod generate;
pub mod ics;
pub mod merge;
pub mod scrape;
pub mod source;

pub use cache::{CacheError, CacheStore};
pub use config::Config;
pub use document::CalendarDocument;
pub use event::{Event, EventKey, RawRow};
pub use scrape::TimetableScraper;
pub use source::{SourceDescriptor, SourceFetcher};
