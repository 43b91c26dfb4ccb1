use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use harvest_crawler::{BatchCrawler, CacheMode, CrawlResult, CrawlerRunConfig, OnError};
use harvest_extract::JsonCssExtractionStrategy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BatchError;
use crate::summary::{LinkFailureKind, RunSummary};
use crate::writer::write_output;

pub const SCHEMA_FILE: &str = "schema.json";
pub const LINKS_FILE: &str = "links.json";

/// A target link, keys other than `url` are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPaths {
    pub schema_path: PathBuf,
    pub links_path: PathBuf,
    pub output_dir: PathBuf,
}

impl BatchPaths {
    /// `schema.json` and `links.json` read from `dir`, outputs written to `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            schema_path: dir.join(SCHEMA_FILE),
            links_path: dir.join(LINKS_FILE),
            output_dir: dir.to_path_buf(),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, BatchError> {
    let file = File::open(path).map_err(|e| BatchError::config_load(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| BatchError::config_load(path, e))
}

pub fn load_schema(path: &Path) -> Result<Value, BatchError> {
    read_json(path)
}

pub fn load_links(path: &Path) -> Result<Vec<LinkEntry>, BatchError> {
    read_json(path)
}

/// Settings every batch crawl runs with, whatever the base configuration says.
pub fn batch_run_config(base: &CrawlerRunConfig) -> CrawlerRunConfig {
    let mut config = base
        .clone()
        .with_cache_mode(CacheMode::Bypass)
        .with_header("Accept-Charset", "utf-8");
    config.on_fetch_error = OnError::SkipAndLog;
    config
}

/// Crawls every link of `paths.links_path` with the CSS schema of `paths.schema_path`
/// and writes one `test<index>.json` per successful link into `paths.output_dir`.
///
/// Inputs are fully loaded before `crawler` is called. Links that fail are not
/// written and are recorded in the returned summary instead.
pub async fn run_batch<C>(
    crawler: &C,
    paths: &BatchPaths,
    config: &CrawlerRunConfig,
) -> Result<RunSummary, BatchError>
where
    C: BatchCrawler + ?Sized,
{
    let schema = load_schema(&paths.schema_path)?;
    let strategy = JsonCssExtractionStrategy::new(schema)
        .map_err(|e| BatchError::config_load(&paths.schema_path, e))?;
    if let Some(name) = &strategy.schema().name {
        log::info!("Loaded schema {name:?}");
    }
    let links = load_links(&paths.links_path)?;
    let urls: Vec<String> = links.into_iter().map(|link| link.url).collect();

    fs::create_dir_all(&paths.output_dir).map_err(|source| BatchError::Io {
        path: paths.output_dir.clone(),
        source,
    })?;

    let mut summary = RunSummary::new(urls.len());
    if urls.is_empty() {
        log::info!("No links in {}", paths.links_path.display());
        return Ok(summary);
    }

    log::info!("Crawling {} link(s)", urls.len());
    let results = crawler
        .crawl_many(&urls, &batch_run_config(config), &strategy)
        .await
        .map_err(BatchError::Crawl)?;

    if results.len() != urls.len() {
        log::warn!(
            "Crawler returned {} result(s) for {} link(s)",
            results.len(),
            urls.len()
        );
    }

    let mut results = results.into_iter();
    for (index, url) in urls.iter().enumerate() {
        match results.next() {
            Some(result) => save_result(&mut summary, &paths.output_dir, index, url, result),
            None => summary.record_failure(
                index,
                url,
                LinkFailureKind::Extraction,
                "No result returned by the crawler",
            ),
        }
    }

    if summary.is_complete() {
        log::info!("All {} link(s) extracted", summary.attempted);
    } else {
        log::warn!(
            "{}/{} link(s) extracted, {} failed",
            summary.written,
            summary.attempted,
            summary.failures.len()
        );
    }
    Ok(summary)
}

fn save_result(
    summary: &mut RunSummary,
    output_dir: &Path,
    index: usize,
    url: &str,
    result: CrawlResult,
) {
    if !result.success {
        let reason = result
            .error_message
            .unwrap_or_else(|| String::from("unknown error"));
        summary.record_failure(index, url, LinkFailureKind::Extraction, reason);
        return;
    }

    let parsed = result
        .extracted_content
        .as_deref()
        .map(serde_json::from_str::<Value>);
    let payload = match parsed {
        Some(Ok(payload)) => payload,
        Some(Err(e)) => {
            summary.record_failure(
                index,
                url,
                LinkFailureKind::Extraction,
                format!("Unparseable extracted content: {e}"),
            );
            return;
        }
        None => {
            summary.record_failure(
                index,
                url,
                LinkFailureKind::Extraction,
                "No extracted content",
            );
            return;
        }
    };

    match write_output(output_dir, index, &payload) {
        Ok(path) => {
            log::info!("Wrote {url} to {}", path.display());
            summary.record_written();
        }
        Err(e) => {
            summary.record_failure(index, url, LinkFailureKind::Serialization, e.to_string())
        }
    }
}
