use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::{Decider, DecisionContext};
use crate::analysis::compute_indicators;
use crate::config::{AppConfig, EngineConfig, RiskConfig, SentimentConfig};
use crate::domain::{Action, Decision, Indicators, OrderResponse, OrderTag, Position};
use crate::error::{Result, SentinelError};
use crate::exchange::Broker;
use crate::news::{CachedNewsService, NewsService};
use crate::persistence::AuditSink;
use crate::strategy::trail::{Outcome, Stage, StepEvent, Trail};
use crate::strategy::{OrderExecutor, PositionManager, RiskManager, StopManager};
use crate::telemetry::{CycleObserver, TracingObserver};

/// Summary of one evaluated cycle
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub symbol: String,
    pub decision: Decision,
    /// Close of the latest candle
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
    /// Confirmed orders, in submission order
    pub orders: Vec<OrderResponse>,
    /// Decision reason followed by every blocked/failed annotation
    pub reason: String,
    pub trail: Vec<StepEvent>,
    /// Realized P&L when this cycle reduced or closed a position
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Decimal>,
}

/// Per-cycle decision/execution engine.
///
/// `step` is the only entry point. Scheduling is the caller's concern; the
/// engine is `Sync` and may be stepped for several symbols concurrently.
pub struct Engine {
    config: EngineConfig,
    risk_config: RiskConfig,
    sentiment_config: SentimentConfig,
    broker: Arc<dyn Broker>,
    decider: Arc<dyn Decider>,
    news: Option<Arc<dyn NewsService>>,
    positions: Arc<PositionManager>,
    risk: Arc<RiskManager>,
    stops: StopManager,
    executor: OrderExecutor,
    observer: Arc<dyn CycleObserver>,
}

/// Cycle state threaded through the stages
struct Cycle<'a> {
    symbol: &'a str,
    price: Decimal,
    atr: Decimal,
    trail: Trail,
    orders: Vec<OrderResponse>,
    realized_pnl: Option<Decimal>,
}

impl Engine {
    pub fn new(
        config: &AppConfig,
        broker: Arc<dyn Broker>,
        decider: Arc<dyn Decider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config: config.engine.clone(),
            risk_config: config.risk.clone(),
            sentiment_config: config.sentiment.clone(),
            executor: OrderExecutor::new(Arc::clone(&broker), audit),
            broker,
            decider,
            news: None,
            positions: Arc::new(PositionManager::new()),
            risk: Arc::new(RiskManager::new(config.risk.account_value)),
            stops: StopManager::new(config.stops.clone()),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Attach sentiment enrichment (used only when `sentiment.enabled`)
    pub fn with_news(mut self, news: Arc<dyn NewsService>) -> Self {
        self.news = Some(news);
        self
    }

    /// Attach `news` behind a TTL cache built from the sentiment settings.
    ///
    /// Returns the cache sweeper handle; it finishes once `shutdown` is
    /// cancelled.
    pub fn with_cached_news(
        self,
        news: Arc<dyn NewsService>,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (cached, sweeper) =
            CachedNewsService::from_config(news, &self.sentiment_config, shutdown);
        (self.with_news(Arc::new(cached)), sweeper)
    }

    pub fn with_observer(mut self, observer: Arc<dyn CycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Share a position book with another engine or a reporting task
    pub fn with_positions(mut self, positions: Arc<PositionManager>) -> Self {
        self.positions = positions;
        self
    }

    pub fn positions(&self) -> &Arc<PositionManager> {
        &self.positions
    }

    pub fn risk(&self) -> &Arc<RiskManager> {
        &self.risk
    }

    pub fn stops(&self) -> &StopManager {
        &self.stops
    }

    /// Run one cycle for `symbol`.
    ///
    /// Fails only before anything is mutated: candle fetch, insufficient
    /// data, oracle failure, or cancellation. Later problems become
    /// annotations on the result.
    pub async fn step(&self, symbol: &str, cancel: &CancellationToken) -> Result<StepResult> {
        let symbol = symbol.trim().to_ascii_uppercase();

        // 1. Market data
        let candles = self
            .guarded(
                "candle fetch",
                cancel,
                self.broker.recent_candles(&symbol, self.config.candle_window),
            )
            .await
            .map_err(SentinelError::into_fetch)?;

        if candles.len() < self.config.min_candles {
            return Err(SentinelError::InsufficientData {
                symbol,
                got: candles.len(),
                need: self.config.min_candles,
            });
        }
        let latest = candles
            .last()
            .cloned()
            .ok_or_else(|| SentinelError::InsufficientData {
                symbol: symbol.clone(),
                got: 0,
                need: self.config.min_candles.max(1),
            })?;

        // 2. Indicators
        let indicators = compute_indicators(&candles, &self.config.indicators);

        let mut cycle = Cycle {
            symbol: &symbol,
            price: latest.close,
            atr: indicators.atr_decimal(),
            trail: Trail::new(),
            orders: Vec::new(),
            realized_pnl: None,
        };

        // 3. Forced exit preempts the oracle
        if let Some(position) = self.positions.get(&symbol) {
            if self
                .stops
                .check_stop_loss(cycle.price, position.stop_price, Some(&position))
            {
                if let Some(decision) = self
                    .forced_exit(&mut cycle, &position, cancel)
                    .await?
                {
                    return Ok(self.finish(cycle, decision, &indicators));
                }
            }
        }

        // 4. Context
        let context = self.build_context(&mut cycle, cancel).await?;

        // 5. Oracle
        let decision = self
            .guarded(
                "oracle",
                cancel,
                self.decider.decide(&symbol, &latest, &indicators, &context),
            )
            .await
            .map_err(SentinelError::into_oracle)?;
        self.record(
            &mut cycle,
            Stage::Oracle,
            Outcome::Ok,
            format!("{} ({:.2})", decision.action, decision.confidence),
        );

        // 6-7. Quantity and execution
        match decision.action {
            Action::Buy => {
                let quantity = self.resolve_quantity(&symbol, &decision);
                self.execute_buy(&mut cycle, &decision, quantity, cancel)
                    .await?;
            }
            Action::Sell => {
                let quantity = self.resolve_quantity(&symbol, &decision);
                self.execute_sell(&mut cycle, &decision, quantity, cancel)
                    .await?;
            }
            Action::Hold => {}
        }

        // 8. Trailing stop
        if self.stops.is_trailing_enabled() {
            if let Some(held) = self.positions.get(&symbol) {
                let candidate = self.stops.compute_stop(cycle.price, cycle.atr);
                if self
                    .positions
                    .update_trailing_stop(&symbol, candidate, cycle.atr)
                {
                    self.record(
                        &mut cycle,
                        Stage::Trailing,
                        Outcome::Adjusted,
                        format!("stop raised {} -> {}", held.stop_price, candidate),
                    );
                }
            }
        }

        // 9. Result
        Ok(self.finish(cycle, decision, &indicators))
    }

    /// Race a collaborator call against cancellation and the per-call deadline
    async fn guarded<T, F>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let deadline = Duration::from_millis(self.config.call_timeout_ms);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SentinelError::Cancelled),
            outcome = tokio::time::timeout(deadline, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(SentinelError::Timeout {
                    operation,
                    elapsed_ms: self.config.call_timeout_ms,
                }),
            },
        }
    }

    /// Orders are never raced against cancellation; we only refuse to start one
    fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(SentinelError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Full-quantity stop-loss sell. `Some(decision)` when the position was
    /// closed; `None` when the order failed and the cycle should continue.
    async fn forced_exit(
        &self,
        cycle: &mut Cycle<'_>,
        position: &Position,
        cancel: &CancellationToken,
    ) -> Result<Option<Decision>> {
        let detail = format!(
            "price {} <= stop {} on {} held",
            cycle.price, position.stop_price, position.quantity
        );
        self.record(cycle, Stage::StopLoss, Outcome::Triggered, detail.clone());

        let decision = Decision::new(Action::Sell, 1.0, format!("stop-loss: {}", detail))
            .with_quantity(position.quantity);

        Self::ensure_not_cancelled(cancel)?;
        match self
            .executor
            .sell(
                cycle.symbol,
                position.quantity,
                OrderTag::StopLoss,
                cycle.price,
                &decision,
            )
            .await
        {
            Ok(response) => {
                let closed = self.positions.close(cycle.symbol);
                let pnl = closed
                    .as_ref()
                    .map(|p| p.unrealized_pnl(cycle.price))
                    .unwrap_or_default();
                cycle.orders.push(response);
                cycle.realized_pnl = Some(pnl);
                self.record(
                    cycle,
                    Stage::Position,
                    Outcome::Ok,
                    format!("closed by stop-loss, realized {:.2}", pnl),
                );
                info!(
                    "Stop-loss exit {} x{} @ {} (stop {}), PnL {:.2}",
                    cycle.symbol, position.quantity, cycle.price, position.stop_price, pnl
                );
                Ok(Some(decision))
            }
            Err(e) => {
                self.record(
                    cycle,
                    Stage::StopLoss,
                    Outcome::Failed,
                    format!("forced exit not filled, position kept: {}", e),
                );
                Ok(None)
            }
        }
    }

    async fn build_context(
        &self,
        cycle: &mut Cycle<'_>,
        cancel: &CancellationToken,
    ) -> Result<DecisionContext> {
        let mut context = DecisionContext::new();
        context.insert(
            "current_price".to_string(),
            json!(cycle.price.to_f64().unwrap_or_default()),
        );
        context.insert(
            "risk".to_string(),
            json!({
                "max_risk_pct": self.risk_config.max_risk_pct.to_f64().unwrap_or_default(),
                "account_value": self.risk.account_value().to_f64().unwrap_or_default(),
            }),
        );

        let Some(news) = self.news.as_ref().filter(|_| self.sentiment_config.enabled) else {
            return Ok(context);
        };

        match self
            .guarded("sentiment", cancel, news.get_sentiment(cycle.symbol))
            .await
        {
            Ok(sentiment) if sentiment.confidence >= self.sentiment_config.min_confidence => {
                self.record(
                    cycle,
                    Stage::Sentiment,
                    Outcome::Ok,
                    format!(
                        "{} ({:.2}, {} articles)",
                        sentiment.overall_sentiment, sentiment.confidence, sentiment.article_count
                    ),
                );
                context.insert(
                    "sentiment".to_string(),
                    json!({
                        "overall": sentiment.overall_sentiment,
                        "score": sentiment.score,
                        "confidence": sentiment.confidence,
                        "recommendation": sentiment.recommendation,
                        "summary": sentiment.summary,
                        "article_count": sentiment.article_count,
                    }),
                );
            }
            Ok(sentiment) => {
                self.record(
                    cycle,
                    Stage::Sentiment,
                    Outcome::Skipped,
                    format!(
                        "confidence {:.2} below {:.2}",
                        sentiment.confidence, self.sentiment_config.min_confidence
                    ),
                );
            }
            Err(SentinelError::Cancelled) => return Err(SentinelError::Cancelled),
            Err(e) => {
                warn!("Sentiment unavailable for {}: {}", cycle.symbol, e);
                self.record(cycle, Stage::Sentiment, Outcome::Failed, e.to_string());
            }
        }

        Ok(context)
    }

    /// Oracle quantity, then the per-symbol table, then the side default
    fn resolve_quantity(&self, symbol: &str, decision: &Decision) -> u64 {
        decision
            .explicit_quantity()
            .or_else(|| self.config.symbol_quantity(symbol))
            .unwrap_or(match decision.action {
                Action::Sell => self.config.default_sell_quantity,
                _ => self.config.default_buy_quantity,
            })
    }

    async fn execute_buy(
        &self,
        cycle: &mut Cycle<'_>,
        decision: &Decision,
        quantity: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if quantity == 0 {
            self.record(cycle, Stage::Quantity, Outcome::Skipped, "resolved buy quantity is 0");
            return Ok(());
        }

        let check = self.risk.validate_trade(
            cycle.symbol,
            cycle.price,
            quantity,
            self.risk_config.max_risk_pct,
        );
        if check.exceeded {
            self.record(
                cycle,
                Stage::Risk,
                Outcome::Blocked,
                format!(
                    "exposure {} ({:.2}%) exceeds max {}%",
                    check.exposure, check.exposure_pct, self.risk_config.max_risk_pct
                ),
            );
            return Ok(());
        }

        Self::ensure_not_cancelled(cancel)?;
        match self
            .executor
            .buy(
                cycle.symbol,
                quantity,
                OrderTag::Llm,
                cycle.price,
                decision,
            )
            .await
        {
            Ok(response) => {
                let stop = self.stops.compute_stop(cycle.price, cycle.atr);
                let position =
                    self.positions
                        .add_buy(cycle.symbol, quantity, cycle.price, cycle.atr, stop);
                self.record(
                    cycle,
                    Stage::Order,
                    Outcome::Ok,
                    format!("BUY x{} as {}", quantity, response.order_id),
                );
                cycle.orders.push(response);
                self.record(
                    cycle,
                    Stage::Position,
                    Outcome::Ok,
                    format!(
                        "{} @ avg {:.4}, stop {}",
                        position.quantity, position.avg_entry_price, position.stop_price
                    ),
                );
            }
            Err(e) => {
                self.record(cycle, Stage::Order, Outcome::Failed, format!("BUY x{}: {}", quantity, e));
            }
        }
        Ok(())
    }

    async fn execute_sell(
        &self,
        cycle: &mut Cycle<'_>,
        decision: &Decision,
        quantity: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if quantity == 0 {
            self.record(cycle, Stage::Quantity, Outcome::Skipped, "resolved sell quantity is 0");
            return Ok(());
        }

        let quantity = match self.positions.get(cycle.symbol) {
            Some(held) if quantity > held.quantity => {
                self.record(
                    cycle,
                    Stage::Quantity,
                    Outcome::Adjusted,
                    format!("sell {} clamped to held {}", quantity, held.quantity),
                );
                held.quantity
            }
            _ => quantity,
        };

        Self::ensure_not_cancelled(cancel)?;
        match self
            .executor
            .sell(
                cycle.symbol,
                quantity,
                OrderTag::Llm,
                cycle.price,
                decision,
            )
            .await
        {
            Ok(response) => {
                let outcome = self
                    .positions
                    .reduce_sell(cycle.symbol, quantity, cycle.price);
                self.record(
                    cycle,
                    Stage::Order,
                    Outcome::Ok,
                    format!("SELL x{} as {}", quantity, response.order_id),
                );
                cycle.orders.push(response);
                match outcome {
                    Some(sold) => {
                        cycle.realized_pnl = Some(sold.realized_pnl);
                        let detail = if sold.closed {
                            format!("closed, realized {:.2}", sold.realized_pnl)
                        } else {
                            format!("reduced by {}, realized {:.2}", sold.quantity, sold.realized_pnl)
                        };
                        self.record(cycle, Stage::Position, Outcome::Ok, detail);
                    }
                    None => {
                        self.record(cycle, Stage::Position, Outcome::Skipped, "no open position");
                    }
                }
            }
            Err(e) => {
                self.record(cycle, Stage::Order, Outcome::Failed, format!("SELL x{}: {}", quantity, e));
            }
        }
        Ok(())
    }

    fn record(
        &self,
        cycle: &mut Cycle<'_>,
        stage: Stage,
        outcome: Outcome,
        detail: impl Into<String>,
    ) {
        let event = cycle.trail.push(stage, outcome, detail);
        self.observer.on_event(cycle.symbol, event);
    }

    fn finish(&self, cycle: Cycle<'_>, decision: Decision, indicators: &Indicators) -> StepResult {
        self.executor
            .log_decision(cycle.symbol, &decision, cycle.price, indicators);

        let reason = cycle.trail.render(&decision.reason);
        let result = StepResult {
            symbol: cycle.symbol.to_string(),
            decision,
            price: cycle.price,
            timestamp: Utc::now(),
            orders: cycle.orders,
            reason,
            trail: cycle.trail.into_events(),
            realized_pnl: cycle.realized_pnl,
        };
        debug!("{} cycle trail: {} events", result.symbol, result.trail.len());
        self.observer.on_complete(&result);
        result
    }
}
