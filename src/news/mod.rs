//! Optional news sentiment enrichment
//!
//! The engine consults a [`NewsService`] when enrichment is enabled; any
//! failure here is logged and the cycle proceeds without sentiment.

pub mod cache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use cache::{CachedNewsService, SentimentCache};

/// Aggregated news sentiment for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    /// e.g. "bullish", "bearish", "neutral"
    pub overall_sentiment: String,
    /// Signed score, typically in [-1, 1]
    pub score: f64,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub recommendation: String,
    pub summary: String,
    pub article_count: u32,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NewsService: Send + Sync {
    async fn get_sentiment(&self, symbol: &str) -> Result<Sentiment>;
}
