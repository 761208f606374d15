//! TTL cache for sentiment lookups
//!
//! Concurrent readers, single writer; a background sweep evicts expired
//! entries so symbols that stop trading do not pin memory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{NewsService, Sentiment};
use crate::config::SentimentConfig;
use crate::error::Result;

#[derive(Debug, Clone)]
struct CachedSentiment {
    sentiment: Sentiment,
    fetched_at: Instant,
}

pub struct SentimentCache {
    entries: RwLock<HashMap<String, CachedSentiment>>,
    ttl: Duration,
}

impl SentimentCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Fresh entry for `symbol`, if any
    pub async fn get(&self, symbol: &str) -> Option<Sentiment> {
        let entries = self.entries.read().await;
        entries
            .get(symbol)
            .filter(|e| e.fetched_at.elapsed() < self.ttl)
            .map(|e| e.sentiment.clone())
    }

    pub async fn insert(&self, symbol: &str, sentiment: Sentiment) {
        let mut entries = self.entries.write().await;
        entries.insert(
            symbol.to_string(),
            CachedSentiment {
                sentiment,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries, returning how many were removed
    pub async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.fetched_at.elapsed() < ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Spawn the periodic eviction task; it exits when `shutdown` is cancelled
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Sentiment cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = cache.evict_expired().await;
                        if evicted > 0 {
                            debug!("Evicted {} expired sentiment entries", evicted);
                        }
                    }
                }
            }
        })
    }
}

/// [`NewsService`] wrapper that serves repeated lookups from a [`SentimentCache`]
pub struct CachedNewsService {
    inner: Arc<dyn NewsService>,
    cache: Arc<SentimentCache>,
}

impl CachedNewsService {
    pub fn new(inner: Arc<dyn NewsService>, cache: Arc<SentimentCache>) -> Self {
        Self { inner, cache }
    }

    /// Cache `inner` with `cache_ttl_secs` and start the sweeper on
    /// `sweep_interval_secs`. The sweeper runs until `shutdown` is cancelled.
    pub fn from_config(
        inner: Arc<dyn NewsService>,
        config: &SentimentConfig,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let cache = Arc::new(SentimentCache::new(Duration::from_secs(
            config.cache_ttl_secs.max(1),
        )));
        let sweeper = cache.spawn_sweeper(
            Duration::from_secs(config.sweep_interval_secs.max(1)),
            shutdown,
        );
        info!(
            "Sentiment cache: ttl {}s, sweep every {}s",
            config.cache_ttl_secs, config.sweep_interval_secs
        );
        (Self::new(inner, cache), sweeper)
    }

    pub fn cache(&self) -> &Arc<SentimentCache> {
        &self.cache
    }
}

#[async_trait]
impl NewsService for CachedNewsService {
    async fn get_sentiment(&self, symbol: &str) -> Result<Sentiment> {
        if let Some(hit) = self.cache.get(symbol).await {
            debug!("Sentiment cache hit for {}", symbol);
            return Ok(hit);
        }

        let sentiment = self.inner.get_sentiment(symbol).await?;
        self.cache.insert(symbol, sentiment.clone()).await;
        Ok(sentiment)
    }
}
