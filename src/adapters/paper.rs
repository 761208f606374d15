//! In-memory paper broker
//!
//! Serves candles loaded from a JSON file (`{"AAPL": [candle, ...]}`) and
//! fills every order immediately. In replay mode each candle request reveals
//! one more bar, so a scheduled run walks forward through the history.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Candle, OrderRequest, OrderResponse, OrderStatus};
use crate::error::{Result, SentinelError};
use crate::exchange::Broker;

#[derive(Debug)]
struct Series {
    candles: Vec<Candle>,
    /// Bars visible to the next request (replay mode only)
    visible: usize,
}

pub struct PaperBroker {
    series: RwLock<HashMap<String, Series>>,
    orders: Mutex<Vec<OrderRequest>>,
    /// Initial visible bars per symbol; `None` serves the full history
    replay_warmup: Option<usize>,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            orders: Mutex::new(Vec::new()),
            replay_warmup: None,
        }
    }

    /// Reveal `warmup` bars first, then one more per candle request
    pub fn with_replay(mut self, warmup: usize) -> Self {
        self.replay_warmup = Some(warmup);
        self
    }

    /// Load `{"SYMBOL": [candles]}` from a JSON file
    pub async fn load_file(&self, path: &Path) -> Result<usize> {
        let raw = tokio::fs::read_to_string(path).await?;
        let data: HashMap<String, Vec<Candle>> = serde_json::from_str(&raw)?;
        let symbols = data.len();
        for (symbol, candles) in data {
            self.load_candles(&symbol, candles).await;
        }
        info!("Paper broker loaded {} symbols from {:?}", symbols, path);
        Ok(symbols)
    }

    /// Replace the history for `symbol`; bars are sorted by time
    pub async fn load_candles(&self, symbol: &str, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.timestamp);
        let visible = self
            .replay_warmup
            .map_or(candles.len(), |w| w.min(candles.len()));
        debug!("{}: {} candles ({} visible)", symbol, candles.len(), visible);
        self.series
            .write()
            .await
            .insert(normalize(symbol), Series { candles, visible });
    }

    pub async fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.read().await.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Every order accepted so far
    pub async fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().await.clone()
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

#[async_trait]
impl Broker for PaperBroker {
    fn name(&self) -> &str {
        "paper"
    }

    async fn recent_candles(&self, symbol: &str, count: usize) -> Result<Vec<Candle>> {
        let mut series = self.series.write().await;
        let entry = series
            .get_mut(&normalize(symbol))
            .ok_or_else(|| SentinelError::Fetch(format!("no paper candles for {}", symbol)))?;

        let end = entry.visible.min(entry.candles.len());
        let start = end.saturating_sub(count);
        let window = entry.candles[start..end].to_vec();

        if self.replay_warmup.is_some() && entry.visible < entry.candles.len() {
            entry.visible += 1;
        }
        Ok(window)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResponse> {
        info!(
            "PAPER: {} {} x{} [{}]",
            request.side, request.symbol, request.quantity, request.tag
        );
        self.orders.lock().await.push(request.clone());

        Ok(OrderResponse {
            order_id: Uuid::new_v4().to_string(),
            status: OrderStatus::Filled,
            message: "paper fill".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderTag;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn bars(n: usize) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        (0..n)
            .map(|i| {
                let close = Decimal::from(100 + i as i64);
                Candle {
                    timestamp: start + Duration::minutes(i as i64),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: Decimal::ZERO,
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn serves_the_most_recent_window() {
        let broker = PaperBroker::new();
        let mut candles = bars(10);
        candles.reverse();
        broker.load_candles("aapl", candles).await;

        let window = broker.recent_candles("AAPL", 3).await.unwrap();
        let closes: Vec<Decimal> = window.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![Decimal::from(107), Decimal::from(108), Decimal::from(109)]);
    }

    #[tokio::test]
    async fn replay_reveals_one_bar_per_request() {
        let broker = PaperBroker::new().with_replay(5);
        broker.load_candles("AAPL", bars(7)).await;

        assert_eq!(broker.recent_candles("AAPL", 100).await.unwrap().len(), 5);
        assert_eq!(broker.recent_candles("AAPL", 100).await.unwrap().len(), 6);
        assert_eq!(broker.recent_candles("AAPL", 100).await.unwrap().len(), 7);
        assert_eq!(broker.recent_candles("AAPL", 100).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn unknown_symbol_is_a_fetch_error() {
        let broker = PaperBroker::new();
        let err = broker.recent_candles("NVDA", 10).await.unwrap_err();
        assert!(matches!(err, SentinelError::Fetch(_)));
    }

    #[tokio::test]
    async fn orders_fill_immediately() {
        let broker = PaperBroker::new();
        let response = broker
            .place_order(&OrderRequest::buy("AAPL", 3, OrderTag::Llm))
            .await
            .unwrap();
        assert_eq!(response.status, OrderStatus::Filled);
        assert!(!response.order_id.is_empty());
        assert_eq!(broker.submitted_orders().await.len(), 1);
    }

    #[tokio::test]
    async fn loads_candles_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candles.json");
        let data = HashMap::from([("msft".to_string(), bars(4))]);
        std::fs::write(&path, serde_json::to_string(&data).unwrap()).unwrap();

        let broker = PaperBroker::new();
        assert_eq!(broker.load_file(&path).await.unwrap(), 1);
        assert_eq!(broker.symbols().await, vec!["MSFT".to_string()]);
        assert_eq!(broker.recent_candles("MSFT", 10).await.unwrap().len(), 4);
    }
}
