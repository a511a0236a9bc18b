//! The in-memory calendar document: a small header plus the verbatim
//! text of each top-level component.
//!
//! Blocks that arrive from external feeds are kept byte-for-byte and
//! re-emitted unchanged, so vendor-specific properties survive the
//! merge without a lossy re-encode.

use crate::event::EventKey;

/// PRODID stamped on documents we synthesize ourselves.
pub const DEFAULT_PRODID: &str = "-//tablefeed//timetable feed//EN";

/// The only iCalendar version we emit.
pub const ICAL_VERSION: &str = "2.0";

/// One top-level component (`BEGIN:X` .. `END:X`), lines preserved
/// verbatim. VEVENT blocks additionally carry their de-duplication key
/// when one could be parsed out of them.
#[derive(Debug, Clone)]
pub struct ComponentBlock {
    /// Component name as written in the BEGIN line, uppercased.
    pub name: String,
    /// The full block text, CRLF-delimited, including BEGIN/END lines.
    pub raw: String,
    pub key: Option<EventKey>,
}

impl ComponentBlock {
    pub fn is_event(&self) -> bool {
        self.name == "VEVENT"
    }
}

/// A calendar document: header fields plus an unordered set of events
/// (held as blocks). Ordering of blocks is preserved on serialization
/// but carries no meaning.
#[derive(Debug, Clone)]
pub struct CalendarDocument {
    pub prodid: String,
    pub version: String,
    blocks: Vec<ComponentBlock>,
}

impl CalendarDocument {
    /// An empty document with the default header.
    pub fn empty() -> Self {
        CalendarDocument {
            prodid: DEFAULT_PRODID.to_string(),
            version: ICAL_VERSION.to_string(),
            blocks: Vec::new(),
        }
    }

    pub fn with_header(prodid: impl Into<String>, version: impl Into<String>) -> Self {
        CalendarDocument {
            prodid: prodid.into(),
            version: version.into(),
            blocks: Vec::new(),
        }
    }

    pub fn push_block(&mut self, block: ComponentBlock) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[ComponentBlock] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<ComponentBlock> {
        self.blocks
    }

    /// Number of VEVENT blocks in the document.
    pub fn event_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_event()).count()
    }

    /// De-duplication keys of all events that have one.
    pub fn event_keys(&self) -> impl Iterator<Item = &EventKey> {
        self.blocks.iter().filter_map(|b| b.key.as_ref())
    }

    /// Serialize to the wire format, CRLF line endings throughout.
    pub fn to_ics(&self) -> String {
        let mut out = String::new();
        out.push_str("BEGIN:VCALENDAR\r\n");
        out.push_str(&format!("VERSION:{}\r\n", self.version));
        out.push_str(&format!("PRODID:{}\r\n", self.prodid));
        for block in &self.blocks {
            out.push_str(&block.raw);
            if !block.raw.ends_with("\r\n") {
                out.push_str("\r\n");
            }
        }
        out.push_str("END:VCALENDAR\r\n");
        out
    }
}

impl Default for CalendarDocument {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_block(uid: &str) -> ComponentBlock {
        ComponentBlock {
            name: "VEVENT".to_string(),
            raw: format!(
                "BEGIN:VEVENT\r\nUID:{uid}\r\nSUMMARY:T\r\nDTSTART:20250101T100000Z\r\nDTEND:20250101T110000Z\r\nEND:VEVENT"
            ),
            key: Some(EventKey::new("T", "20250101T100000Z", "20250101T110000Z")),
        }
    }

    #[test]
    fn empty_document_serializes_with_default_header() {
        let ics = CalendarDocument::empty().to_ics();
        assert_eq!(
            ics,
            format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:{DEFAULT_PRODID}\r\nEND:VCALENDAR\r\n")
        );
    }

    #[test]
    fn counts_only_event_blocks() {
        let mut doc = CalendarDocument::empty();
        doc.push_block(event_block("a"));
        doc.push_block(ComponentBlock {
            name: "VTIMEZONE".to_string(),
            raw: "BEGIN:VTIMEZONE\r\nTZID:Europe/Berlin\r\nEND:VTIMEZONE".to_string(),
            key: None,
        });
        doc.push_block(event_block("b"));
        assert_eq!(doc.event_count(), 2);
        assert_eq!(doc.event_keys().count(), 2);
    }

    #[test]
    fn blocks_round_trip_verbatim() {
        let mut doc = CalendarDocument::empty();
        let block = ComponentBlock {
            name: "VEVENT".to_string(),
            raw: "BEGIN:VEVENT\r\nUID:x\r\nX-VENDOR-FIELD:kept\r\nEND:VEVENT".to_string(),
            key: None,
        };
        doc.push_block(block.clone());
        let ics = doc.to_ics();
        assert!(ics.contains(&block.raw));
    }
}
