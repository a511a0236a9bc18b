//! Fetching one external calendar source.
//!
//! A source is either a plain calendar-feed URL or, when credentials
//! are configured, a CalDAV collection. Failure is isolated per
//! source: a single attempt, no retries, and never a partial result.

use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::caldav;
use crate::document::CalendarDocument;
use crate::ics::parse_document;

/// Bound on one feed download; a hung source must not stall the merge.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// One configured external calendar source. Constructed once per
/// request cycle from configuration, never mutated.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl SourceDescriptor {
    /// Both credentials present means an authenticated CalDAV fetch.
    pub fn requires_auth(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("source returned a malformed calendar: {0}")]
    Malformed(String),
}

/// Retrieves raw event sets from external sources.
pub struct SourceFetcher {
    client: reqwest::Client,
}

impl SourceFetcher {
    pub fn new() -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(SourceFetcher { client })
    }

    /// Fetch one source's event set as a parsed document.
    pub async fn fetch(&self, source: &SourceDescriptor) -> Result<CalendarDocument, FetchError> {
        if source.requires_auth() {
            caldav::fetch_collection(source).await
        } else {
            self.fetch_feed(source).await
        }
    }

    async fn fetch_feed(&self, source: &SourceDescriptor) -> Result<CalendarDocument, FetchError> {
        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Unreachable(e.to_string()))?;

        if !looks_like_calendar(&body) {
            return Err(FetchError::Malformed(format!(
                "no VCALENDAR in response from {}",
                source.url
            )));
        }

        let doc = parse_document(&body);
        debug!(url = %source.url, events = doc.event_count(), "fetched calendar feed");
        Ok(doc)
    }
}

fn looks_like_calendar(body: &str) -> bool {
    body.lines()
        .any(|line| line.trim().eq_ignore_ascii_case("BEGIN:VCALENDAR"))
}
