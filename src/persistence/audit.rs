//! Append-only audit trail
//!
//! Line-delimited JSON, one file per local calendar day, in two partitions:
//! - `trades/trades-YYYY-MM-DD.jsonl`: confirmed order executions
//! - `decisions/decisions-YYYY-MM-DD.jsonl`: one record per evaluated cycle
//!
//! Records are self-contained and carry a local-time timestamp assigned at
//! write time. Files are only ever appended to.
//!
//! Appends are synchronous. The executor writes the trade record between a
//! confirmed fill and the position commit, and that window must not contain
//! an `.await`.

use chrono::{DateTime, Local};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::domain::{Action, Indicators, OrderSide, OrderTag};
use crate::error::Result;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Confirmed execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub price: Decimal,
    pub order_id: String,
    pub tag: OrderTag,
    pub reason: String,
    pub confidence: f64,
}

/// Cycle decision, written whether or not an order followed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub symbol: String,
    pub action: Action,
    pub confidence: f64,
    pub reason: String,
    pub price: Decimal,
    pub indicators: Indicators,
}

/// Record as it lands on disk
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEntry<T> {
    pub timestamp: String,
    #[serde(flatten)]
    pub record: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Trades,
    Decisions,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Trades => "trades",
            Partition::Decisions => "decisions",
        }
    }
}

/// Destination for audit records
pub trait AuditSink: Send + Sync {
    fn append_trade(&self, record: &TradeRecord) -> Result<()>;

    fn append_decision(&self, record: &DecisionRecord) -> Result<()>;
}

/// Sink that drops everything (audit disabled)
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn append_trade(&self, _record: &TradeRecord) -> Result<()> {
        Ok(())
    }

    fn append_decision(&self, _record: &DecisionRecord) -> Result<()> {
        Ok(())
    }
}

/// Daily JSONL files under a root directory
pub struct JsonlAuditLog {
    root: PathBuf,
    /// Serializes appends so concurrent cycles never interleave lines
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File a record written at `now` lands in
    pub fn file_for(&self, partition: Partition, now: DateTime<Local>) -> PathBuf {
        self.root.join(partition.as_str()).join(format!(
            "{}-{}.jsonl",
            partition.as_str(),
            now.format("%Y-%m-%d")
        ))
    }

    /// Append a record with an explicit clock reading
    pub fn append_at<T: Serialize>(
        &self,
        partition: Partition,
        record: &T,
        now: DateTime<Local>,
    ) -> Result<PathBuf> {
        let entry = AuditEntry {
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            record,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let path = self.file_for(partition, now);
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;

        debug!("Appended {} audit record to {:?}", partition.as_str(), path);
        Ok(path)
    }
}

impl AuditSink for JsonlAuditLog {
    fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        self.append_at(Partition::Trades, record, Local::now())
            .map(|_| ())
    }

    fn append_decision(&self, record: &DecisionRecord) -> Result<()> {
        self.append_at(Partition::Decisions, record, Local::now())
            .map(|_| ())
    }
}
