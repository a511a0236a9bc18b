//! Shared application state: the immutable configuration plus the
//! long-lived core components.

use std::sync::Arc;

use anyhow::Result;

use tablefeed_core::{CacheStore, Config, SourceFetcher, TimetableScraper};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub cache: Arc<CacheStore>,
    pub scraper: Arc<TimetableScraper>,
    pub fetcher: Arc<SourceFetcher>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        Ok(AppState {
            config: Arc::new(config),
            cache: Arc::new(CacheStore::with_defaults()),
            scraper: Arc::new(TimetableScraper::new()?),
            fetcher: Arc::new(SourceFetcher::new()?),
        })
    }
}
