//! File-backed artifacts with regenerate-or-serve-stale semantics.
//!
//! Per artifact path, evaluated fresh on every access:
//! - age ≤ TTL: serve the file unchanged.
//! - older (or missing): regenerate. Success overwrites the file
//!   wholesale and serves the new content. Failure serves the existing
//!   file as long as its age is within the hard timeout; past that (or
//!   with no file at all) the cache is exhausted and the caller gets
//!   the only error this service ever shows a client.
//!
//! Concurrent requests that observe the same stale artifact are
//! serialized on a per-path lock; whoever wins regenerates, the rest
//! re-check freshness and serve the winner's artifact.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Age up to which an artifact is served without regeneration.
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Age past which even a stale artifact is refused.
pub const CACHE_HARD_TIMEOUT: Duration = Duration::from_secs(2 * 24 * 60 * 60);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("no fresh or usable stale artifact for {path}: {reason}")]
    Exhausted { path: PathBuf, reason: String },

    #[error("artifact I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Owns the freshness decision for every artifact path it serves.
pub struct CacheStore {
    ttl: Duration,
    hard_timeout: Duration,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl CacheStore {
    pub fn new(ttl: Duration, hard_timeout: Duration) -> Self {
        CacheStore {
            ttl,
            hard_timeout,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CACHE_TTL, CACHE_HARD_TIMEOUT)
    }

    /// Serve the artifact at `path`, regenerating it first when stale.
    ///
    /// `regenerate` produces the full new artifact content; it runs at
    /// most once per path at a time.
    pub async fn serve<F, Fut>(&self, path: &Path, regenerate: F) -> Result<String, CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<String>>,
    {
        if self.is_fresh(path) {
            match tokio::fs::read_to_string(path).await {
                Ok(content) => {
                    debug!(path = %path.display(), "serving fresh artifact");
                    return Ok(content);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "fresh artifact unreadable; regenerating");
                }
            }
        }

        let lock = self.lock_for(path);
        let _guard = lock.lock().await;

        // Another request may have regenerated while we waited.
        if self.is_fresh(path) {
            if let Ok(content) = tokio::fs::read_to_string(path).await {
                debug!(path = %path.display(), "artifact refreshed while waiting for lock");
                return Ok(content);
            }
        }

        match regenerate().await {
            Ok(content) => {
                // Full-file overwrite; mtime advances, artifact is fresh.
                tokio::fs::write(path, &content).await?;
                info!(path = %path.display(), bytes = content.len(), "artifact regenerated");
                Ok(content)
            }
            Err(err) => match artifact_age(path) {
                Some(age) if age <= self.hard_timeout => {
                    warn!(
                        path = %path.display(),
                        age_secs = age.as_secs(),
                        error = %format!("{err:#}"),
                        "regeneration failed; serving stale artifact"
                    );
                    Ok(tokio::fs::read_to_string(path).await?)
                }
                _ => Err(CacheError::Exhausted {
                    path: path.to_path_buf(),
                    reason: format!("{err:#}"),
                }),
            },
        }
    }

    fn is_fresh(&self, path: &Path) -> bool {
        matches!(artifact_age(path), Some(age) if age <= self.ttl)
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Age of the artifact from its filesystem mtime; None when missing.
/// An mtime in the future (clock skew) counts as age zero.
fn artifact_age(path: &Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}
