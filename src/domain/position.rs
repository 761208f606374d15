use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Open long position for one symbol.
///
/// Exists only while `quantity > 0`; mutated only through
/// [`crate::strategy::PositionManager`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: u64,
    pub avg_entry_price: Decimal,
    /// Never decreases while the position lives
    pub stop_price: Decimal,
    /// Last-seen ATR
    pub atr: Decimal,
    /// Set once on the opening fill
    pub entry_time: DateTime<Utc>,
}

impl Position {
    /// Cost basis of the open quantity
    pub fn notional_value(&self) -> Decimal {
        self.avg_entry_price * Decimal::from(self.quantity)
    }

    /// Unrealized P&L at `price`
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.avg_entry_price) * Decimal::from(self.quantity)
    }

    /// Holding time in seconds as of `now`
    pub fn holding_duration_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entry_time).num_seconds()
    }
}
