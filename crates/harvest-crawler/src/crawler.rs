use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::header::USER_AGENT;
use tokio::time::{sleep, timeout};

use crate::config::{CrawlerRunConfig, OnError, Throttle};
use crate::limiter::{RateLimitedExt, RateLimiter};
use crate::strategy::{CrawlResult, ExtractionStrategy, PageLocation};
use crate::text::word_count;

/// Fetch-and-extract capability consumed by batch runs.
#[async_trait]
pub trait BatchCrawler: Send + Sync {
    async fn crawl(
        &self,
        url: &str,
        config: &CrawlerRunConfig,
        strategy: &dyn ExtractionStrategy,
    ) -> CrawlResult;

    /// Crawls all `urls` concurrently, as allowed by `config.throttle`.
    ///
    /// Returns exactly one result per URL, in the order of `urls`.
    async fn crawl_many(
        &self,
        urls: &[String],
        config: &CrawlerRunConfig,
        strategy: &dyn ExtractionStrategy,
    ) -> Result<Vec<CrawlResult>> {
        let jobs = urls
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, url): (usize, String)| async move {
                (index, self.crawl(&url, config, strategy).await)
            });

        let done: Vec<(usize, CrawlResult)> = match config.throttle {
            Throttle::Concurrent(n) => stream::iter(jobs).buffer_unordered(n.get()).collect().await,
            Throttle::PerSecond(n) => {
                stream::iter(jobs)
                    .rate_limited(RateLimiter::new(n.get()))
                    .collect()
                    .await
            }
            Throttle::Delay(secs) => {
                let delay = Duration::try_from_secs_f32(secs.max(0.0))
                    .map_err(|e| anyhow!("Invalid throttle delay {secs}s: {e}"))?;
                stream::iter(jobs)
                    .enumerate()
                    .then(|(nth, job)| async move {
                        if nth > 0 {
                            sleep(delay).await;
                        }
                        job.await
                    })
                    .collect()
                    .await
            }
        };

        let mut slots: Vec<Option<CrawlResult>> = vec![None; urls.len()];
        for (index, result) in done {
            slots[index] = Some(result);
        }

        let mut results = Vec::with_capacity(urls.len());
        for (slot, url) in slots.into_iter().zip(urls) {
            let result = slot.unwrap_or_else(|| CrawlResult::failure(url, None, "Missing result"));
            if !result.success {
                let reason = result.error_message.as_deref().unwrap_or("unknown error");
                match config.on_fetch_error {
                    OnError::SkipAndLog => log::warn!("Skipping URL: {url} got: {reason}"),
                    OnError::Fail => bail!("Couldn't crawl {url} got: {reason}"),
                }
            }
            results.push(result);
        }

        Ok(results)
    }
}

#[derive(Debug, Clone)]
struct Page {
    status: u16,
    html: String,
}

/// HTTP implementation of [`BatchCrawler`].
///
/// Owns its HTTP session and page cache, both released when dropped.
#[derive(Debug)]
pub struct WebCrawler {
    client: reqwest::Client,
    cache: Mutex<HashMap<String, String>>,
}

impl WebCrawler {
    pub fn new() -> Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .deflate(true)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_pages(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn cache_get(&self, url: &str) -> Option<String> {
        self.cache.lock().ok()?.get(url).cloned()
    }

    fn cache_put(&self, url: &str, html: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(url.to_string(), html.to_string());
        }
    }

    async fn download(&self, config: &CrawlerRunConfig, url: &str) -> Result<Page> {
        let mut req = self
            .client
            .get(url)
            .header(USER_AGENT, &config.user_agent);
        for (name, value) in &config.extra_headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let html = resp.text().await?;
        Ok(Page { status, html })
    }

    async fn download_until_loaded(&self, config: &CrawlerRunConfig, url: &str) -> Result<Page> {
        let mut attempt = 1;
        loop {
            let page = self.download(config, url).await?;
            if !(200..300).contains(&page.status) {
                return Ok(page);
            }
            let words = word_count(&page.html);
            if words >= config.word_count_threshold {
                return Ok(page);
            }
            log::debug!(
                "Page {url} not loaded yet ({words} words, attempt {attempt}), retrying"
            );
            attempt += 1;
            sleep(config.retry_delay()).await;
        }
    }

    async fn fetch(&self, config: &CrawlerRunConfig, url: &str) -> Result<Page> {
        if config.cache_mode.reads() {
            if let Some(html) = self.cache_get(url) {
                log::debug!("Cache hit for {url}");
                return Ok(Page { status: 200, html });
            }
        }

        let page = match timeout(config.page_timeout(), self.download_until_loaded(config, url))
            .await
        {
            Ok(page) => page?,
            Err(_) => {
                return Err(anyhow!(
                    "Page timeout after {}ms waiting for {url}",
                    config.page_timeout
                ))
            }
        };

        if config.cache_mode.writes() && (200..300).contains(&page.status) {
            self.cache_put(url, &page.html);
        }

        Ok(page)
    }
}

#[async_trait]
impl BatchCrawler for WebCrawler {
    async fn crawl(
        &self,
        url: &str,
        config: &CrawlerRunConfig,
        strategy: &dyn ExtractionStrategy,
    ) -> CrawlResult {
        let Page { status, html } = match self.fetch(config, url).await {
            Ok(page) => page,
            Err(e) => return CrawlResult::failure(url, None, format!("{e:#}")),
        };

        if !(200..300).contains(&status) {
            return CrawlResult::failure(url, Some(status), format!("HTTP status {status}"));
        }

        let location = PageLocation::Url(url.to_string());
        let extracted = match strategy.extract(&html, &location).await {
            Ok(extracted) => extracted,
            Err(e) => {
                return CrawlResult::failure(url, Some(status), format!("Extraction failed: {e:#}"))
            }
        };

        match CrawlResult::success(url, status, html, &extracted) {
            Ok(result) => result,
            Err(e) => CrawlResult::failure(url, Some(status), format!("Extraction failed: {e:#}")),
        }
    }
}
