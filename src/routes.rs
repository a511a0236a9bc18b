//! Feed endpoints.
//!
//! Per-row and per-source failures are absorbed inside the core; the
//! only error a client ever sees is an exhausted cache.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use tablefeed_core::{generate::build_primary, ics::parse_document, merge::merge, CacheError};

use crate::state::AppState;

/// Exhausted-cache failures become a plain 500 with a readable message.
pub struct AppError(CacheError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError(err)
    }
}

/// GET <primary-route>: the scraped timetable as a calendar feed.
pub async fn primary_feed(State(state): State<AppState>) -> Result<Response, AppError> {
    let ics = refresh_primary(&state).await?;
    Ok(calendar_response(ics))
}

/// GET <merged-route>: primary plus all configured external sources.
pub async fn merged_feed(State(state): State<AppState>) -> Result<Response, AppError> {
    // Primary freshness first. A dead primary cache does not abort the
    // merge: the merge synthesizes a default header from whatever is
    // on disk.
    if let Err(err) = refresh_primary(&state).await {
        warn!(error = %err, "primary refresh failed; merging from the artifact on disk");
    }

    let path = state.config.merged_artifact();
    let ics = state
        .cache
        .serve(&path, || async {
            let primary_path = state.config.primary_artifact();
            let primary_text = tokio::fs::read_to_string(&primary_path)
                .await
                .unwrap_or_default();
            let primary = parse_document(&primary_text);
            let merged = merge(primary, &state.config.sources, &state.fetcher).await;
            Ok(merged.to_ics())
        })
        .await?;

    Ok(calendar_response(ics))
}

async fn refresh_primary(state: &AppState) -> Result<String, CacheError> {
    let path = state.config.primary_artifact();
    state
        .cache
        .serve(&path, || async {
            let rows = state.scraper.fetch_rows(&state.config.source_url).await?;
            let doc = build_primary(&rows, state.config.source_timezone);
            Ok(doc.to_ics())
        })
        .await
}

fn calendar_response(ics: String) -> Response {
    (
        [(header::CONTENT_TYPE, "text/calendar; charset=utf-8")],
        ics,
    )
        .into_response()
}
