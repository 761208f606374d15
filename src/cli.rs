use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::PaperBroker;
use crate::agent::RuleBasedDecider;
use crate::config::{AppConfig, AuditConfig};
use crate::error::{Result, SentinelError};
use crate::exchange::Broker;
use crate::persistence::{AuditSink, JsonlAuditLog, NullAuditSink};
use crate::scheduler::{shutdown_signal, Scheduler, SymbolStats};
use crate::strategy::{Engine, StepResult};

#[derive(Parser)]
#[command(name = "sentinel")]
#[command(version)]
#[command(about = "Per-cycle trading engine with stop-loss, trailing stop and risk gating", long_about = None)]
pub struct Cli {
    /// Configuration directory (default.toml plus $SENTINEL_ENV overrides)
    #[arg(short, long, default_value = "config", env = "SENTINEL_CONFIG_DIR")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate one cycle against paper candles and print the result as JSON
    Step {
        /// Symbol to evaluate (e.g., AAPL)
        #[arg(short, long)]
        symbol: String,
        /// Candle file ({"AAPL": [...]}); defaults to paper.candles_file
        #[arg(long)]
        candles: Option<PathBuf>,
    },
    /// Run the paper-trading scheduler until Ctrl-C
    Run {
        /// Comma-separated symbols (e.g., AAPL,MSFT)
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
        /// Seconds between cycles per symbol
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
        /// Candle file ({"AAPL": [...]}); defaults to paper.candles_file
        #[arg(long)]
        candles: Option<PathBuf>,
        /// Reveal one candle per cycle instead of serving the full history
        #[arg(long)]
        replay: bool,
    },
}

/// Audit sink for the configured settings
pub fn audit_sink(config: &AuditConfig) -> Arc<dyn AuditSink> {
    if config.enabled {
        let log = JsonlAuditLog::new(&config.dir);
        info!("Audit log at {:?}", log.root());
        Arc::new(log)
    } else {
        warn!("Audit log disabled");
        Arc::new(NullAuditSink)
    }
}

/// Paper broker seeded from `candles` or `paper.candles_file`
pub async fn paper_broker(
    config: &AppConfig,
    candles: Option<&Path>,
    replay: bool,
) -> Result<Arc<PaperBroker>> {
    let path = candles
        .or(config.paper.candles_file.as_deref())
        .ok_or_else(|| {
            SentinelError::Validation(
                "no candle file: pass --candles or set paper.candles_file".to_string(),
            )
        })?;

    let broker = if replay {
        PaperBroker::new().with_replay(config.engine.min_candles)
    } else {
        PaperBroker::new()
    };
    broker.load_file(path).await?;
    Ok(Arc::new(broker))
}

/// Engine wired for paper mode: paper broker, rule-based decider
pub fn paper_engine(config: &AppConfig, broker: Arc<PaperBroker>) -> Engine {
    info!(
        "Engine on {} broker (rules: oversold {}, overbought {})",
        broker.name(),
        config.paper.rules.oversold,
        config.paper.rules.overbought
    );
    Engine::new(
        config,
        broker,
        Arc::new(RuleBasedDecider::new(config.paper.rules.clone())),
        audit_sink(&config.audit),
    )
}

pub async fn run_step(
    config: &AppConfig,
    symbol: &str,
    candles: Option<&Path>,
) -> Result<StepResult> {
    let broker = paper_broker(config, candles, false).await?;
    let engine = paper_engine(config, broker);

    let result = engine.step(symbol, &CancellationToken::new()).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result)
}

pub async fn run_paper(
    config: &AppConfig,
    symbols: &[String],
    interval: Duration,
    candles: Option<&Path>,
    replay: bool,
) -> Result<Vec<SymbolStats>> {
    let broker = paper_broker(config, candles, replay).await?;
    let engine = Arc::new(paper_engine(config, broker));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let scheduler = Scheduler::new(Arc::clone(&engine), interval);
    let stats = scheduler.run(symbols, &shutdown).await;

    for s in &stats {
        println!(
            "{:<8} cycles {:>5}  failed {:>4}  orders {:>4}",
            s.symbol, s.cycles, s.failures, s.orders
        );
    }
    for position in engine.positions().snapshot() {
        println!(
            "open {:<8} x{} @ avg {:.4}  cost {:.2}  stop {}  since {}",
            position.symbol,
            position.quantity,
            position.avg_entry_price,
            position.notional_value(),
            position.stop_price,
            position.entry_time.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use rust_decimal::Decimal;
    use std::collections::HashMap;

    #[test]
    fn parses_run_symbols() {
        let cli = Cli::try_parse_from([
            "sentinel",
            "run",
            "--symbols",
            "AAPL,MSFT",
            "--interval-secs",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                symbols,
                interval_secs,
                replay,
                ..
            } => {
                assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);
                assert_eq!(interval_secs, 5);
                assert!(!replay);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_symbols() {
        assert!(Cli::try_parse_from(["sentinel", "run"]).is_err());
    }

    #[tokio::test]
    async fn step_without_candles_is_a_validation_error() {
        let config = AppConfig::default();
        let err = run_step(&config, "AAPL", None).await.unwrap_err();
        assert!(matches!(err, SentinelError::Validation(_)));
    }

    #[tokio::test]
    async fn step_runs_against_candle_file() {
        let dir = tempfile::tempdir().unwrap();
        let start = Utc::now() - ChronoDuration::minutes(60);
        let candles: Vec<crate::domain::Candle> = (0..60)
            .map(|i| {
                let close = Decimal::from(100);
                crate::domain::Candle {
                    timestamp: start + ChronoDuration::minutes(i),
                    open: close,
                    high: close + Decimal::ONE,
                    low: close - Decimal::ONE,
                    close,
                    volume: Decimal::from(10),
                }
            })
            .collect();
        let path = dir.path().join("candles.json");
        std::fs::write(
            &path,
            serde_json::to_string(&HashMap::from([("AAPL", candles)])).unwrap(),
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.audit.dir = dir.path().join("audit");

        let result = run_step(&config, "AAPL", Some(&path)).await.unwrap();
        assert_eq!(result.symbol, "AAPL");
        assert!(result.orders.is_empty());
        assert!(dir.path().join("audit").join("decisions").exists());
    }
}
