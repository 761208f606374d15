//! Fixed-interval cycle scheduler
//!
//! One task per symbol, each stepping the shared engine on its own ticker.
//! Cycles for different symbols may overlap; the engine's position book is
//! the only shared mutable state. All tasks stop when the shutdown token is
//! cancelled, and an in-flight cycle sees the same token.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SentinelError;
use crate::strategy::Engine;

/// Per-symbol counters reported when a task stops
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SymbolStats {
    pub symbol: String,
    pub cycles: u64,
    pub failures: u64,
    pub orders: u64,
}

pub struct Scheduler {
    engine: Arc<Engine>,
    interval: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Spawn one task per symbol
    pub fn spawn(
        &self,
        symbols: &[String],
        shutdown: &CancellationToken,
    ) -> Vec<JoinHandle<SymbolStats>> {
        symbols
            .iter()
            .map(|symbol| {
                let engine = Arc::clone(&self.engine);
                let shutdown = shutdown.clone();
                let interval = self.interval;
                let symbol = symbol.clone();
                tokio::spawn(async move { run_symbol(engine, symbol, interval, shutdown).await })
            })
            .collect()
    }

    /// Run until `shutdown` is cancelled and return the final counters
    pub async fn run(&self, symbols: &[String], shutdown: &CancellationToken) -> Vec<SymbolStats> {
        info!(
            "Scheduler starting {} symbols every {:?}",
            symbols.len(),
            self.interval
        );

        let mut stats = Vec::with_capacity(symbols.len());
        for handle in self.spawn(symbols, shutdown) {
            match handle.await {
                Ok(s) => stats.push(s),
                Err(e) => error!("Symbol task panicked: {}", e),
            }
        }

        info!("Scheduler stopped");
        stats
    }
}

async fn run_symbol(
    engine: Arc<Engine>,
    symbol: String,
    interval: Duration,
    shutdown: CancellationToken,
) -> SymbolStats {
    let mut stats = SymbolStats {
        symbol: symbol.clone(),
        ..SymbolStats::default()
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match engine.step(&symbol, &shutdown).await {
            Ok(result) => {
                stats.cycles += 1;
                stats.orders += result.orders.len() as u64;
            }
            Err(SentinelError::Cancelled) => break,
            Err(e @ SentinelError::InsufficientData { .. }) => {
                stats.failures += 1;
                debug!("{}: {}", symbol, e);
            }
            Err(e) => {
                stats.failures += 1;
                warn!("{} cycle failed: {}", symbol, e);
            }
        }
    }

    info!(
        "{} stopped after {} cycles ({} failed, {} orders)",
        symbol, stats.cycles, stats.failures, stats.orders
    );
    stats
}

/// Resolves on Ctrl-C (or SIGTERM on unix)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PaperBroker;
    use crate::agent::MockDecider;
    use crate::config::AppConfig;
    use crate::domain::{Candle, Decision};
    use crate::persistence::NullAuditSink;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal_macros::dec;

    fn bars(n: usize) -> Vec<Candle> {
        let start = Utc::now() - ChronoDuration::minutes(n as i64);
        (0..n)
            .map(|i| Candle {
                timestamp: start + ChronoDuration::minutes(i as i64),
                open: dec!(100),
                high: dec!(101),
                low: dec!(99),
                close: dec!(100),
                volume: dec!(500),
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_until_shutdown() {
        let broker = Arc::new(PaperBroker::new());
        broker.load_candles("AAPL", bars(30)).await;
        // MSFT has no data: every cycle is a fetch failure
        let mut decider = MockDecider::new();
        decider
            .expect_decide()
            .returning(|_, _, _, _| Ok(Decision::hold("flat")));

        let mut config = AppConfig::default();
        config.engine.min_candles = 20;
        config.engine.candle_window = 30;
        let engine = Arc::new(Engine::new(
            &config,
            broker,
            Arc::new(decider),
            Arc::new(NullAuditSink),
        ));

        let scheduler = Scheduler::new(engine, Duration::from_secs(10));
        let shutdown = CancellationToken::new();
        let handles = scheduler.spawn(&["AAPL".to_string(), "MSFT".to_string()], &shutdown);

        // Ticks at 0s, 10s and 20s
        tokio::time::sleep(Duration::from_secs(25)).await;
        shutdown.cancel();

        let mut stats = Vec::new();
        for handle in handles {
            stats.push(handle.await.unwrap());
        }

        assert_eq!(stats[0].symbol, "AAPL");
        assert_eq!(stats[0].cycles, 3);
        assert_eq!(stats[0].orders, 0);
        assert_eq!(stats[1].cycles, 0);
        assert_eq!(stats[1].failures, 3);
    }
}
