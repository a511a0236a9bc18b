//! Authenticated CalDAV fetch using libdav.
//!
//! One source fetch discovers the principal and calendar home set,
//! enumerates the calendar collections under it, selects the one whose
//! canonical URL matches the configured source URL (falling back to
//! the first enumerated collection when there is no exact match), and
//! downloads every entry in it. Any failure along the way converts to
//! `FetchError::Unreachable`; a source never yields a partial result.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use http::{Method, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::{client::legacy::Client, rt::TokioExecutor};
use libdav::caldav::{FindCalendarHomeSet, GetCalendarResources};
use libdav::dav::WebDavClient;
use libdav::requests::{DavRequest, ParseResponseError, PreparedRequest};
use libdav::CalDavClient;
use percent_encoding::percent_decode_str;
use tower::ServiceBuilder;
use tower_http::{auth::AddAuthorization, follow_redirect::FollowRedirect};
use tracing::{debug, warn};

use crate::document::CalendarDocument;
use crate::ics::parse_document;
use crate::source::{FetchError, SourceDescriptor};

/// HTTP service stack: basic auth plus redirect following over rustls.
type HttpClient = FollowRedirect<
    AddAuthorization<
        Client<hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>, String>,
    >,
>;

type DavSession = CalDavClient<HttpClient>;

/// Bound on the whole discovery-plus-download conversation; one hung
/// server must not stall the merge.
const CALDAV_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetch the whole event set of one authenticated source.
pub(crate) async fn fetch_collection(
    source: &SourceDescriptor,
) -> Result<CalendarDocument, FetchError> {
    match tokio::time::timeout(CALDAV_TIMEOUT, fetch_collection_inner(source)).await {
        Ok(result) => result.map_err(|err| FetchError::Unreachable(format!("{err:#}"))),
        Err(_) => Err(FetchError::Unreachable(format!(
            "CalDAV fetch timed out after {}s",
            CALDAV_TIMEOUT.as_secs()
        ))),
    }
}

async fn fetch_collection_inner(source: &SourceDescriptor) -> Result<CalendarDocument> {
    let (username, password) = match (&source.username, &source.password) {
        (Some(u), Some(p)) => (u.as_str(), p.as_str()),
        _ => return Err(anyhow!("credentials missing for {}", source.url)),
    };

    let session = open_session(&source.url, username, password)?;

    let principal = session
        .find_current_user_principal()
        .await
        .context("finding current user principal")?
        .ok_or_else(|| anyhow!("server reports no current user principal"))?;

    let home_set = session
        .request(FindCalendarHomeSet::new(&principal))
        .await
        .context("finding calendar home set")?
        .home_sets
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no calendar home set for this account"))?;

    let home_href = home_set.path().to_string();
    let collections = session
        .request(ListCalendarCollections::new(&home_href))
        .await
        .context("enumerating calendar collections")?
        .hrefs;

    let selected = select_collection(&source.url, &collections)
        .ok_or_else(|| anyhow!("account has no calendar collections"))?;

    let response = session
        .request(GetCalendarResources::new(&selected))
        .await
        .context("fetching collection entries")?;

    let mut doc = CalendarDocument::empty();
    for resource in response.resources {
        let content = resource
            .content
            .map_err(|status| anyhow!("entry {} failed with status {status}", resource.href))?;
        for block in parse_document(&content.data).into_blocks() {
            if block.is_event() {
                doc.push_block(block);
            }
        }
    }

    debug!(url = %source.url, events = doc.event_count(), "fetched CalDAV collection");
    Ok(doc)
}

fn open_session(base_url: &str, username: &str, password: &str) -> Result<DavSession> {
    let uri: Uri = base_url
        .parse()
        .with_context(|| format!("invalid source URL: {base_url}"))?;

    let connector = HttpsConnectorBuilder::new()
        .with_native_roots()
        .context("loading native TLS roots")?
        .https_or_http()
        .enable_http1()
        .build();

    let http_client = Client::builder(TokioExecutor::new()).build(connector);
    let auth_client = AddAuthorization::basic(http_client, username, password);
    let client = ServiceBuilder::new()
        .layer(tower_http::follow_redirect::FollowRedirectLayer::new())
        .service(auth_client);

    Ok(CalDavClient::new(WebDavClient::new(uri, client)))
}

/// Pick the collection whose canonical URL matches the requested one.
/// No exact match falls back to the first enumerated collection; that
/// is a deliberate degraded-success path and is logged as such.
fn select_collection(requested_url: &str, collections: &[String]) -> Option<String> {
    let wanted = canonical_path(requested_url);
    if let Some(exact) = collections.iter().find(|href| canonical_path(href) == wanted) {
        return Some(exact.clone());
    }

    let first = collections.first()?;
    warn!(
        requested = %requested_url,
        fallback = %first,
        "no collection matches the requested URL; using the first enumerated collection"
    );
    Some(first.clone())
}

/// Canonical form of a collection URL for matching: path component
/// only, percent-decoded, trailing slashes stripped.
fn canonical_path(value: &str) -> String {
    let path = value
        .parse::<Uri>()
        .map(|uri| uri.path().to_string())
        .unwrap_or_else(|_| value.to_string());
    percent_decode_str(&path)
        .decode_utf8_lossy()
        .trim_end_matches('/')
        .to_string()
}

// ============================================================================
// Collection enumeration: PROPFIND on the calendar home set
// ============================================================================

/// Depth-1 PROPFIND on the home set, keeping only responses whose
/// resourcetype marks a calendar collection.
struct ListCalendarCollections<'a> {
    home_set_href: &'a str,
}

impl<'a> ListCalendarCollections<'a> {
    fn new(home_set_href: &'a str) -> Self {
        ListCalendarCollections { home_set_href }
    }
}

struct ListCalendarCollectionsResponse {
    hrefs: Vec<String>,
}

impl DavRequest for ListCalendarCollections<'_> {
    type Response = ListCalendarCollectionsResponse;
    type ParseError = ParseResponseError;
    type Error<E> = libdav::dav::WebDavError<E>;

    fn prepare_request(&self) -> std::result::Result<PreparedRequest, http::Error> {
        let body = r#"<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
    <d:prop>
        <d:resourcetype/>
        <d:displayname/>
    </d:prop>
</d:propfind>"#
            .to_string();

        Ok(PreparedRequest {
            method: Method::from_bytes(b"PROPFIND")?,
            path: self.home_set_href.to_string(),
            body,
            headers: vec![("Depth".to_string(), "1".to_string())],
        })
    }

    fn parse_response(
        &self,
        parts: &http::response::Parts,
        body: &[u8],
    ) -> std::result::Result<Self::Response, ParseResponseError> {
        if !parts.status.is_success() {
            return Err(ParseResponseError::BadStatusCode(parts.status));
        }

        let hrefs = parse_collection_hrefs(body)?;
        Ok(ListCalendarCollectionsResponse { hrefs })
    }
}

/// Parse collection hrefs out of a multistatus response.
fn parse_collection_hrefs(body: &[u8]) -> std::result::Result<Vec<String>, ParseResponseError> {
    let text = std::str::from_utf8(body)?;
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();

    let mut hrefs = Vec::new();

    for response in root
        .descendants()
        .filter(|n| n.tag_name().name() == "response")
    {
        let href = response
            .descendants()
            .find(|n| n.tag_name().name() == "href")
            .and_then(|n| n.text())
            .map(str::to_string);

        let Some(href) = href else { continue };

        let is_calendar = response
            .descendants()
            .filter(|n| n.tag_name().name() == "resourcetype")
            .any(|rt| rt.children().any(|c| c.tag_name().name() == "calendar"));

        if is_calendar {
            hrefs.push(href);
        }
    }

    Ok(hrefs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_path_strips_scheme_slash_and_encoding() {
        assert_eq!(
            canonical_path("https://dav.example.com/calendars/user/Stundenplan%20A/"),
            "/calendars/user/Stundenplan A"
        );
        assert_eq!(canonical_path("/calendars/user/Stundenplan A"), "/calendars/user/Stundenplan A");
    }

    #[test]
    fn exact_collection_match_wins() {
        let collections = vec![
            "/calendars/user/work/".to_string(),
            "/calendars/user/private/".to_string(),
        ];
        let selected =
            select_collection("https://dav.example.com/calendars/user/private", &collections);
        assert_eq!(selected.as_deref(), Some("/calendars/user/private/"));
    }

    #[test]
    fn missing_match_falls_back_to_first_collection() {
        let collections = vec![
            "/calendars/user/work/".to_string(),
            "/calendars/user/private/".to_string(),
        ];
        let selected =
            select_collection("https://dav.example.com/calendars/user/gone", &collections);
        assert_eq!(selected.as_deref(), Some("/calendars/user/work/"));
    }

    #[test]
    fn no_collections_is_none() {
        assert_eq!(select_collection("https://dav.example.com/x", &[]), None);
    }

    #[test]
    fn multistatus_parsing_keeps_only_calendar_collections() {
        let body = br#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/calendars/user/</d:href>
    <d:propstat><d:prop><d:resourcetype><d:collection/></d:resourcetype></d:prop></d:propstat>
  </d:response>
  <d:response>
    <d:href>/calendars/user/work/</d:href>
    <d:propstat><d:prop><d:resourcetype><d:collection/><c:calendar/></d:resourcetype></d:prop></d:propstat>
  </d:response>
</d:multistatus>"#;

        let hrefs = parse_collection_hrefs(body).unwrap();
        assert_eq!(hrefs, vec!["/calendars/user/work/".to_string()]);
    }
}
