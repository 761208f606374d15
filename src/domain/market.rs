use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    #[serde(default)]
    pub volume: Decimal,
}

impl Candle {
    /// Close as f64 for indicator math
    pub fn close_f64(&self) -> f64 {
        self.close.to_f64().unwrap_or(0.0)
    }

    pub fn high_f64(&self) -> f64 {
        self.high.to_f64().unwrap_or(0.0)
    }

    pub fn low_f64(&self) -> f64 {
        self.low.to_f64().unwrap_or(0.0)
    }

    /// True range relative to the previous close
    pub fn true_range(&self, prev_close: Option<f64>) -> f64 {
        let high = self.high_f64();
        let low = self.low_f64();
        match prev_close {
            Some(pc) => (high - low).max((high - pc).abs()).max((low - pc).abs()),
            None => high - low,
        }
    }
}

/// Bollinger band snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Indicator snapshot derived from a candle window.
///
/// Values that cannot be computed from a too-short window are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    /// Simple moving averages keyed by window length
    pub sma: BTreeMap<usize, f64>,
    pub rsi: Option<f64>,
    pub bollinger: Option<BollingerBands>,
    pub atr: Option<f64>,
}

impl Indicators {
    pub fn sma(&self, window: usize) -> Option<f64> {
        self.sma.get(&window).copied()
    }

    /// ATR as a decimal for stop math, zero when unavailable
    pub fn atr_decimal(&self) -> Decimal {
        self.atr
            .and_then(|v| Decimal::from_f64_retain(v))
            .map(|d| d.round_dp(8))
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn true_range_uses_previous_close_gap() {
        let candle = Candle {
            timestamp: Utc::now(),
            open: dec!(101),
            high: dec!(103),
            low: dec!(100),
            close: dec!(102),
            volume: dec!(1000),
        };
        assert_eq!(candle.true_range(None), 3.0);
        // Gap down from 106: |100 - 106| = 6
        assert_eq!(candle.true_range(Some(106.0)), 6.0);
    }

    #[test]
    fn atr_decimal_defaults_to_zero() {
        let indicators = Indicators::default();
        assert_eq!(indicators.atr_decimal(), Decimal::ZERO);

        let indicators = Indicators {
            atr: Some(2.0),
            ..Default::default()
        };
        assert_eq!(indicators.atr_decimal(), dec!(2));
    }
}
