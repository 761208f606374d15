//! Process-scoped logging setup and the per-cycle observer seam.

use std::path::Path;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;
use crate::error::{Result, SentinelError};
use crate::strategy::trail::{Outcome, StepEvent};
use crate::strategy::StepResult;

const LOG_FILE_PREFIX: &str = "sentinel.log";

/// Keeps the file writer alive; buffered lines are flushed when dropped
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `config.level`. Console output goes to stderr so
/// command output on stdout stays machine-readable. When `config.dir` is
/// set, a daily rolling file is written as well.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| SentinelError::Validation(format!("invalid log filter: {}", e)))?;

    let (file_layer, file_guard) = match config.dir.as_deref() {
        Some(dir) => {
            let (layer, guard) = file_layer(dir)?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(filter)
        .with(console_layer)
        .try_init()
        .map_err(|e| SentinelError::Internal(format!("logging already initialized: {}", e)))?;

    if let Some(dir) = &config.dir {
        info!("Logging to: {}/{}", dir.display(), LOG_FILE_PREFIX);
    }

    Ok(LoggingGuard { _file: file_guard })
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

fn file_layer(dir: &Path) -> Result<(BoxedLayer, WorkerGuard)> {
    // rolling::daily panics if the first file cannot be created
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".sentinel_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)?;
    let _ = std::fs::remove_file(&probe);

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .boxed();
    Ok((layer, guard))
}

/// Receives every trail event and the finished result of each cycle
pub trait CycleObserver: Send + Sync {
    fn on_event(&self, symbol: &str, event: &StepEvent);

    fn on_complete(&self, result: &StepResult);
}

/// Default observer: forwards to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl CycleObserver for TracingObserver {
    fn on_event(&self, symbol: &str, event: &StepEvent) {
        match event.outcome {
            Outcome::Blocked | Outcome::Failed => warn!(
                symbol,
                stage = event.stage.as_str(),
                "{}",
                event.detail
            ),
            Outcome::Triggered => info!(
                symbol,
                stage = event.stage.as_str(),
                "{}",
                event.detail
            ),
            _ => debug!(
                symbol,
                stage = event.stage.as_str(),
                outcome = event.outcome.as_str(),
                "{}",
                event.detail
            ),
        }
    }

    fn on_complete(&self, result: &StepResult) {
        info!(
            symbol = %result.symbol,
            action = %result.decision.action,
            price = %result.price,
            orders = result.orders.len(),
            "Cycle complete: {}",
            result.reason
        );
    }
}
