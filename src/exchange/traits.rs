use async_trait::async_trait;

use crate::domain::{Candle, OrderRequest, OrderResponse};
use crate::error::Result;

/// Brokerage collaborator: market data plus order placement.
///
/// Implementations must not retry internally; a failed call surfaces to the
/// engine, which retries (if at all) on its next scheduled cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    /// Human-readable name used in logs
    fn name(&self) -> &str;

    /// Most recent `count` bars, ascending by time
    async fn recent_candles(&self, symbol: &str, count: usize) -> Result<Vec<Candle>>;

    /// Submit a market order
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResponse>;
}
