//! Fetching the source timetable page and extracting its export table.
//!
//! The source renders the timetable as an HTML `<table class="export">`
//! encoded in ISO-8859-1. This module delivers clean row tuples; all
//! event semantics live in [`crate::event`] and [`crate::generate`].

use std::time::Duration;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;

use crate::event::RawRow;

/// Bound on how long one page fetch may take; an unreachable source
/// must not stall the whole request.
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ScrapeError {
    #[error("timetable source unreachable: {0}")]
    Unreachable(String),

    #[error("source page contains no export table")]
    NoTable,
}

/// HTTP client for the timetable page.
pub struct TimetableScraper {
    client: reqwest::Client,
}

impl TimetableScraper {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(SCRAPE_TIMEOUT).build()?;
        Ok(TimetableScraper { client })
    }

    /// Fetch the timetable page and extract its rows, header row skipped.
    pub async fn fetch_rows(&self, url: &str) -> Result<Vec<RawRow>, ScrapeError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ScrapeError::Unreachable(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| ScrapeError::Unreachable(e.to_string()))?;

        // The source serves ISO-8859-1 without declaring it.
        let (text, _, _) = encoding_rs::WINDOWS_1252.decode(&body);

        let rows = extract_rows(&text)?;
        debug!(url, rows = rows.len(), "scraped timetable page");
        Ok(rows)
    }
}

/// Pull cell texts out of the export table. The first row is the
/// column header and carries no event.
pub fn extract_rows(html: &str) -> Result<Vec<RawRow>, ScrapeError> {
    let table_selector = Selector::parse("table.export").expect("static selector");
    let row_selector = Selector::parse("tr").expect("static selector");
    let cell_selector = Selector::parse("td").expect("static selector");

    let document = Html::parse_document(html);
    let table = document
        .select(&table_selector)
        .next()
        .ok_or(ScrapeError::NoTable)?;

    let rows = table
        .select(&row_selector)
        .skip(1)
        .map(|tr| {
            tr.select(&cell_selector)
                .map(|td| td.text().collect::<String>().trim().to_string())
                .collect::<RawRow>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    Ok(rows)
}
