//! The feed collaborator: fetches cluster pages from a news aggregator and
//! turns them into batches for the reconciler.

pub mod client;
pub mod source;

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::error::ConfigError;
use crate::model::RawItem;

/// One polled cluster: a proposed label and the items scraped for it.
#[derive(Debug, Clone)]
pub struct ClusterBatch {
    pub label: String,
    pub items: Vec<RawItem>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    /// The aggregator served its bot-check page instead of content.
    #[error("request blocked by the source")]
    Blocked,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("feed parse failed: {0}")]
    Parse(#[from] feed_rs::parser::ParseFeedError),
}

/// Transport options for the fetcher. Replaces the usual pile of global
/// toggles with one explicit object; the store and reconciler never see it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Optional SOCKS5 proxy URL, e.g. `socks5://127.0.0.1:9050`.
    pub proxy: Option<String>,
    /// Base pause before every request, seconds.
    pub pace_base_secs: u64,
    /// Additional random pause on top of the base, seconds.
    pub pace_jitter_secs: u64,
    /// Base backoff after a blocked request, minutes.
    pub block_backoff_mins: u64,
    /// Additional random backoff, minutes.
    pub block_jitter_mins: u64,
    /// Substring of the response body that marks a bot-check page.
    pub block_marker: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            proxy: None,
            pace_base_secs: 5,
            pace_jitter_secs: 10,
            block_backoff_mins: 15,
            block_jitter_mins: 30,
            block_marker: None,
        }
    }
}

impl FetchConfig {
    pub fn pace(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.pace_base_secs),
            Duration::from_secs(self.pace_jitter_secs),
        )
    }

    pub fn block_backoff(&self) -> (Duration, Duration) {
        (
            Duration::from_secs(self.block_backoff_mins * 60),
            Duration::from_secs(self.block_jitter_mins * 60),
        )
    }
}

/// Full feed-source configuration, loaded from a YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// RSS/Atom feed URLs to poll, one batch per cluster page reached.
    pub feeds: Vec<String>,
    #[serde(default)]
    pub fetch: FetchConfig,
}

impl FeedConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        let config: FeedConfig = serde_yaml::from_str(&raw)?;
        if config.feeds.is_empty() {
            return Err(ConfigError::MissingKeys("feeds".to_string()));
        }
        Ok(config)
    }
}
