//! Runtime configuration for the Flow core.
//!
//! All knobs come from the environment so shells (mobile, desktop, CLI) can
//! share one loading path. Remote sync and receipt storage are optional; a
//! core with neither configured runs fully local.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const ENV_DB_PATH: &str = "FLOW_DB_PATH";
const ENV_REMOTE_URL: &str = "FLOW_REMOTE_URL";
const ENV_REMOTE_API_KEY: &str = "FLOW_REMOTE_API_KEY";
const ENV_MEDIA_URL: &str = "FLOW_MEDIA_URL";
const ENV_POLL_INTERVAL_SECS: &str = "FLOW_POLL_INTERVAL_SECS";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Core runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Local cache path; `None` selects an in-memory database
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// Remote document store base URL
    #[serde(default)]
    pub remote_base_url: Option<String>,
    /// Bearer token for the remote store
    #[serde(default)]
    pub remote_api_key: Option<String>,
    /// Receipt blob store base URL
    #[serde(default)]
    pub media_base_url: Option<String>,
    /// Change-poll interval for HTTP subscriptions, in seconds
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

impl CoreConfig {
    /// Load configuration from `FLOW_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let remote_base_url = match normalize_text_option(lookup(ENV_REMOTE_URL)) {
            Some(url) if !is_http_url(&url) => {
                return Err(Error::InvalidInput(format!(
                    "{ENV_REMOTE_URL} must include http:// or https://"
                )));
            }
            other => other,
        };
        let media_base_url = match normalize_text_option(lookup(ENV_MEDIA_URL)) {
            Some(url) if !is_http_url(&url) => {
                return Err(Error::InvalidInput(format!(
                    "{ENV_MEDIA_URL} must include http:// or https://"
                )));
            }
            other => other,
        };

        let poll_interval_secs = match normalize_text_option(lookup(ENV_POLL_INTERVAL_SECS)) {
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                Error::InvalidInput(format!("{ENV_POLL_INTERVAL_SECS} must be an integer"))
            })?),
            None => None,
        };

        Ok(Self {
            database_path: normalize_text_option(lookup(ENV_DB_PATH)).map(PathBuf::from),
            remote_base_url,
            remote_api_key: normalize_text_option(lookup(ENV_REMOTE_API_KEY)),
            media_base_url,
            poll_interval_secs,
        })
    }

    /// Whether remote sync is configured
    #[must_use]
    pub const fn is_sync_configured(&self) -> bool {
        self.remote_base_url.is_some()
    }

    /// Change-poll interval, with the default applied
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS))
    }
}
