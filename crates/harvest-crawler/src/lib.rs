mod config;
mod crawler;
mod limiter;
mod strategy;
pub mod text;

pub use config::{CacheMode, CrawlerRunConfig, OnError, Throttle};
pub use crawler::{BatchCrawler, WebCrawler};
pub use limiter::{RateLimited, RateLimitedExt, RateLimiter};
pub use strategy::{CrawlResult, ExtractionStrategy, PageLocation};

pub use anyhow;
pub use async_trait::async_trait;
