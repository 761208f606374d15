use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::agent::RuleBasedConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub stops: StopConfig,
    #[serde(default)]
    pub sentiment: SentimentConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of candles requested per cycle
    #[serde(default = "default_candle_window")]
    pub candle_window: usize,
    /// Minimum candles required to evaluate a cycle
    #[serde(default = "default_min_candles")]
    pub min_candles: usize,
    /// Quantity used for BUY when neither the oracle nor the symbol table sets one
    #[serde(default = "default_quantity")]
    pub default_buy_quantity: u64,
    /// Quantity used for SELL when neither the oracle nor the symbol table sets one
    #[serde(default = "default_quantity")]
    pub default_sell_quantity: u64,
    /// Per-symbol trade quantity (e.g., AAPL = 10)
    #[serde(default)]
    pub symbol_quantities: HashMap<String, u64>,
    /// Deadline for each collaborator call (candles, sentiment, oracle)
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default)]
    pub indicators: IndicatorConfig,
}

fn default_candle_window() -> usize {
    100
}

fn default_min_candles() -> usize {
    50
}

fn default_quantity() -> u64 {
    1
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            candle_window: default_candle_window(),
            min_candles: default_min_candles(),
            default_buy_quantity: default_quantity(),
            default_sell_quantity: default_quantity(),
            symbol_quantities: HashMap::new(),
            call_timeout_ms: default_call_timeout_ms(),
            indicators: IndicatorConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Configured quantity for a symbol, case-insensitive
    pub fn symbol_quantity(&self, symbol: &str) -> Option<u64> {
        self.symbol_quantities
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(symbol))
            .map(|(_, q)| *q)
            .filter(|q| *q > 0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndicatorConfig {
    #[serde(default = "default_sma_windows")]
    pub sma_windows: Vec<usize>,
    #[serde(default = "default_period_14")]
    pub rsi_period: usize,
    #[serde(default = "default_bollinger_period")]
    pub bollinger_period: usize,
    #[serde(default = "default_bollinger_k")]
    pub bollinger_k: f64,
    #[serde(default = "default_period_14")]
    pub atr_period: usize,
}

fn default_sma_windows() -> Vec<usize> {
    vec![20, 50]
}

fn default_period_14() -> usize {
    14
}

fn default_bollinger_period() -> usize {
    20
}

fn default_bollinger_k() -> f64 {
    2.0
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            sma_windows: default_sma_windows(),
            rsi_period: default_period_14(),
            bollinger_period: default_bollinger_period(),
            bollinger_k: default_bollinger_k(),
            atr_period: default_period_14(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Maximum exposure per trade as % of account value (<= 0 disables the check)
    #[serde(default = "default_max_risk_pct")]
    pub max_risk_pct: Decimal,
    /// Account value baseline until real equity is wired in
    #[serde(default = "default_account_value")]
    pub account_value: Decimal,
}

fn default_max_risk_pct() -> Decimal {
    dec!(2)
}

fn default_account_value() -> Decimal {
    dec!(100000)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_pct: default_max_risk_pct(),
            account_value: default_account_value(),
        }
    }
}

/// Stop price formula
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum StopMode {
    /// Fixed percentage below entry
    Pct,
    /// Fixed ATR multiple below entry
    #[default]
    Atr,
    /// ATR multiple widened by relative volatility
    Volatility,
}

impl FromStr for StopMode {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pct" | "percent" => Ok(Self::Pct),
            "atr" => Ok(Self::Atr),
            "volatility" | "vol" => Ok(Self::Volatility),
            _ => Err("invalid stop mode; expected pct|atr|volatility"),
        }
    }
}

impl TryFrom<String> for StopMode {
    type Error = &'static str;

    fn try_from(raw: String) -> std::result::Result<Self, Self::Error> {
        raw.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopConfig {
    #[serde(default)]
    pub mode: StopMode,
    /// Percentage below entry for PCT mode (e.g., 2 = 2%)
    #[serde(default = "default_stop_pct")]
    pub pct: Decimal,
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: Decimal,
    /// Minimum price increment; stops are rounded to it (<= 0 disables rounding)
    #[serde(default = "default_tick_size")]
    pub tick_size: Decimal,
    #[serde(default = "default_true")]
    pub trailing_enabled: bool,
    /// Maximum holding time before the time-based stop fires
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: u64,
    /// Named percentage presets (tight/medium/wide)
    #[serde(default = "default_presets")]
    pub presets: HashMap<String, Decimal>,
}

fn default_stop_pct() -> Decimal {
    dec!(1.0)
}

fn default_atr_multiplier() -> Decimal {
    dec!(1.5)
}

fn default_tick_size() -> Decimal {
    dec!(0.01)
}

fn default_true() -> bool {
    true
}

fn default_max_hold_secs() -> u64 {
    3600
}

fn default_presets() -> HashMap<String, Decimal> {
    HashMap::from([
        ("tight".to_string(), dec!(0.5)),
        ("medium".to_string(), dec!(1.0)),
        ("wide".to_string(), dec!(2.0)),
    ])
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            mode: StopMode::default(),
            pct: default_stop_pct(),
            atr_multiplier: default_atr_multiplier(),
            tick_size: default_tick_size(),
            trailing_enabled: true,
            max_hold_secs: default_max_hold_secs(),
            presets: default_presets(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SentimentConfig {
    /// Attach news sentiment to the decision context
    #[serde(default)]
    pub enabled: bool,
    /// Minimum sentiment confidence to attach
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    /// How long a cached sentiment stays valid
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Background eviction interval
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_min_confidence() -> f64 {
    0.5
}

fn default_cache_ttl_secs() -> u64 {
    900
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_confidence: default_min_confidence(),
            cache_ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Root directory for the trades/ and decisions/ partitions
    #[serde(default = "default_audit_dir")]
    pub dir: PathBuf,
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("data/audit")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_audit_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files (console only when unset)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info,sentinel=debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaperConfig {
    /// JSON file with candles per symbol for the paper broker
    #[serde(default)]
    pub candles_file: Option<PathBuf>,
    /// RSI thresholds for the rule-based decider
    #[serde(default)]
    pub rules: RuleBasedConfig,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.json", false)?
            .set_default("engine.min_candles", 50)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("SENTINEL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (SENTINEL_RISK__MAX_RISK_PCT, etc.)
            .add_source(
                Environment::with_prefix("SENTINEL")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.engine.min_candles == 0 {
            errors.push("engine.min_candles must be positive".to_string());
        }

        if self.engine.candle_window < self.engine.min_candles {
            errors.push(format!(
                "engine.candle_window ({}) must be >= engine.min_candles ({})",
                self.engine.candle_window, self.engine.min_candles
            ));
        }

        // ATR and RSI need period + 1 bars, Bollinger needs period bars
        let indicators = &self.engine.indicators;
        for (name, need) in [
            ("atr_period", indicators.atr_period + 1),
            ("rsi_period", indicators.rsi_period + 1),
            ("bollinger_period", indicators.bollinger_period),
        ] {
            if self.engine.min_candles < need {
                errors.push(format!(
                    "engine.min_candles ({}) must be >= {} for engine.indicators.{}",
                    self.engine.min_candles, need, name
                ));
            }
        }

        if self.engine.call_timeout_ms == 0 {
            errors.push("engine.call_timeout_ms must be positive".to_string());
        }

        if self.risk.max_risk_pct > Decimal::ZERO && self.risk.account_value <= Decimal::ZERO {
            errors.push("risk.account_value must be positive when risk checks are enabled".to_string());
        }

        if self.stops.mode == StopMode::Pct
            && (self.stops.pct <= Decimal::ZERO || self.stops.pct >= dec!(100))
        {
            errors.push("stops.pct must be between 0 and 100".to_string());
        }

        if self.stops.mode != StopMode::Pct && self.stops.atr_multiplier <= Decimal::ZERO {
            errors.push("stops.atr_multiplier must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.sentiment.min_confidence) {
            errors.push("sentiment.min_confidence must be within [0, 1]".to_string());
        }

        if self.sentiment.cache_ttl_secs == 0 {
            errors.push("sentiment.cache_ttl_secs must be positive".to_string());
        }

        if self.sentiment.sweep_interval_secs == 0 {
            errors.push("sentiment.sweep_interval_secs must be positive".to_string());
        }

        let rules = &self.paper.rules;
        if !(0.0 < rules.oversold && rules.oversold < rules.overbought && rules.overbought < 100.0)
        {
            errors.push(format!(
                "paper.rules thresholds must satisfy 0 < oversold ({}) < overbought ({}) < 100",
                rules.oversold, rules.overbought
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
