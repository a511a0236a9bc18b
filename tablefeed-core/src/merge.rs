//! The merge engine: union of the primary calendar with N external
//! sources.
//!
//! Merging never fails at the document level. Each source is fetched
//! in configured order; a failing source is logged and skipped without
//! touching what other sources contributed. Events arriving from
//! sources are de-duplicated by `(title, start, end)` against
//! everything accumulated so far; the primary's own blocks are never
//! dropped, even when the primary contains internal duplicates.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::document::CalendarDocument;
use crate::event::EventKey;
use crate::source::{SourceDescriptor, SourceFetcher};

/// Combine the primary document with the configured sources. The
/// header is the primary's (the tolerant reader already synthesized a
/// default one when the primary was absent or corrupt).
pub async fn merge(
    primary: CalendarDocument,
    sources: &[SourceDescriptor],
    fetcher: &SourceFetcher,
) -> CalendarDocument {
    let mut merged = primary;
    let mut seen: HashSet<EventKey> = merged.event_keys().cloned().collect();

    for source in sources {
        match fetcher.fetch(source).await {
            Ok(doc) => {
                let mut added = 0usize;
                let mut duplicates = 0usize;
                for block in doc.into_blocks() {
                    if let Some(key) = &block.key {
                        if !seen.insert(key.clone()) {
                            duplicates += 1;
                            continue;
                        }
                    }
                    if block.is_event() {
                        added += 1;
                    }
                    merged.push_block(block);
                }
                info!(source = %source.url, added, duplicates, "merged source");
            }
            Err(err) => {
                warn!(source = %source.url, error = %err, "skipping failed source");
            }
        }
    }

    merged
}
