//! Service configuration.
//!
//! Built once at startup from environment variables and passed into
//! the core by reference; nothing below the route layer reads ambient
//! process state.

use std::path::PathBuf;

use chrono_tz::Tz;
use thiserror::Error;

use crate::source::SourceDescriptor;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_PRIMARY_ROUTE: &str = "/calendar.ics";
const DEFAULT_MERGED_ROUTE: &str = "/merged.ics";
const DEFAULT_TIMEZONE: &str = "Europe/Berlin";
const DEFAULT_DATA_DIR: &str = "/data";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Immutable service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Timetable page the primary calendar is scraped from.
    pub source_url: String,
    pub host: String,
    pub port: u16,
    pub primary_route: String,
    pub merged_route: String,
    /// The single timezone source timestamps are interpreted in.
    pub source_timezone: Tz,
    /// Directory holding the two cache artifacts.
    pub data_dir: PathBuf,
    /// External merge sources, in configured order.
    pub sources: Vec<SourceDescriptor>,
}

impl Config {
    /// Read configuration from process environment. Call once at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key/value lookup (tests use a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let source_url = lookup("SOURCE_URL").ok_or(ConfigError::Missing("SOURCE_URL"))?;

        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let primary_route =
            route_path(lookup("PRIMARY_ROUTE").unwrap_or_else(|| DEFAULT_PRIMARY_ROUTE.to_string()));
        let merged_route =
            route_path(lookup("MERGED_ROUTE").unwrap_or_else(|| DEFAULT_MERGED_ROUTE.to_string()));

        let tz_raw = lookup("SOURCE_TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let source_timezone = tz_raw.parse::<Tz>().map_err(|_| ConfigError::Invalid {
            key: "SOURCE_TIMEZONE",
            value: tz_raw,
        })?;

        let data_dir = PathBuf::from(lookup("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        Ok(Config {
            source_url,
            host,
            port,
            primary_route,
            merged_route,
            source_timezone,
            data_dir,
            sources: external_sources(&lookup),
        })
    }

    /// Path of the primary cache artifact.
    pub fn primary_artifact(&self) -> PathBuf {
        self.data_dir.join("calendar.ics")
    }

    /// Path of the merged cache artifact.
    pub fn merged_artifact(&self) -> PathBuf {
        self.data_dir.join("merged.ics")
    }
}

/// External sources are 1-indexed and contiguous; the list stops at
/// the first missing URL.
fn external_sources(lookup: &impl Fn(&str) -> Option<String>) -> Vec<SourceDescriptor> {
    let mut sources = Vec::new();
    for n in 1.. {
        let Some(url) = lookup(&format!("EXTERNAL_{n}_URL")) else {
            break;
        };
        sources.push(SourceDescriptor {
            url,
            username: lookup(&format!("EXTERNAL_{n}_USERNAME")),
            password: lookup(&format!("EXTERNAL_{n}_PASSWORD")),
        });
    }
    sources
}

fn route_path(raw: String) -> String {
    if raw.starts_with('/') {
        raw
    } else {
        format!("/{raw}")
    }
}
