//! The primary generator: scraped rows in, calendar document out.
//!
//! Per-row failures are absorbed here. A malformed row is logged and
//! skipped; the generator always returns a document, possibly empty.

use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::document::CalendarDocument;
use crate::event::{Event, RawRow};
use crate::ics;

/// Build the primary calendar from raw table rows.
pub fn build_primary(rows: &[RawRow], tz: Tz) -> CalendarDocument {
    let mut doc = CalendarDocument::empty();

    for row in rows {
        if let Some(title) = row.first() {
            if Event::is_absence(title) {
                debug!(title = %title, "filtered absence row");
                continue;
            }
        }

        let event = match Event::from_row(row, tz) {
            Ok(event) => event,
            Err(err) => {
                warn!(row = ?row.first(), error = %err, "skipping malformed row");
                continue;
            }
        };

        match ics::event_block(&event) {
            Ok(block) => doc.push_block(block),
            Err(err) => warn!(title = %event.title, error = %err, "could not render event"),
        }
    }

    doc
}
