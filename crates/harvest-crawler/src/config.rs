use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-run settings handed to a [`BatchCrawler`](crate::BatchCrawler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerRunConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_cache_mode")]
    pub cache_mode: CacheMode,

    /// Pages with fewer visible words are considered not loaded yet
    #[serde(default = "default_word_count_threshold")]
    pub word_count_threshold: usize,

    /// Milliseconds allowed for a page to load, retries included
    #[serde(default = "default_page_timeout")]
    pub page_timeout: u64,

    /// Milliseconds to wait before fetching a not yet loaded page again
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,

    #[serde(default = "default_throttle")]
    pub throttle: Throttle,

    #[serde(default = "default_on_fetch_error")]
    pub on_fetch_error: OnError,
}

impl Default for CrawlerRunConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            cache_mode: default_cache_mode(),
            word_count_threshold: default_word_count_threshold(),
            page_timeout: default_page_timeout(),
            retry_delay: default_retry_delay(),
            extra_headers: BTreeMap::new(),
            throttle: default_throttle(),
            on_fetch_error: default_on_fetch_error(),
        }
    }
}

impl CrawlerRunConfig {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        // Header names are case insensitive, keep a single entry per name
        self.extra_headers
            .retain(|existing, _| !existing.eq_ignore_ascii_case(&name));
        self.extra_headers.insert(name, value.into());
        self
    }

    pub fn with_cache_mode(mut self, cache_mode: CacheMode) -> Self {
        self.cache_mode = cache_mode;
        self
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }
}

fn default_user_agent() -> String {
    String::from("HarvestBot")
}

fn default_cache_mode() -> CacheMode {
    CacheMode::Enabled
}

fn default_word_count_threshold() -> usize {
    1
}

fn default_page_timeout() -> u64 {
    80_000
}

fn default_retry_delay() -> u64 {
    500
}

fn default_throttle() -> Throttle {
    Throttle::default()
}

fn default_on_fetch_error() -> OnError {
    OnError::SkipAndLog
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnError {
    Fail,
    SkipAndLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheMode {
    /// Read from and write to the page cache
    Enabled,
    /// Always fetch fresh pages and leave the cache untouched
    Bypass,
    /// Only serve cached pages, fetch without storing otherwise
    ReadOnly,
    /// Always fetch and store the fetched pages
    WriteOnly,
    Disabled,
}

impl CacheMode {
    pub fn reads(self) -> bool {
        matches!(self, Self::Enabled | Self::ReadOnly)
    }

    pub fn writes(self) -> bool {
        matches!(self, Self::Enabled | Self::WriteOnly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Throttle {
    /// The maximum number of concurrent requests
    Concurrent(NonZeroUsize),
    /// The number of requests per second
    PerSecond(NonZeroUsize),
    /// The delay in seconds between requests
    Delay(f32),
}

impl Default for Throttle {
    fn default() -> Self {
        Self::Concurrent(NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN))
    }
}
