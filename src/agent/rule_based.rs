//! Indicator-threshold decider used in paper mode
//!
//! BUY when RSI is oversold and the close sits under the lower Bollinger
//! band; SELL when RSI is overbought or the close breaks the upper band.

use async_trait::async_trait;
use serde::Deserialize;

use super::{Decider, DecisionContext};
use crate::domain::{Action, Candle, Decision, Indicators};
use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuleBasedConfig {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RuleBasedConfig {
    fn default() -> Self {
        Self {
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

pub struct RuleBasedDecider {
    config: RuleBasedConfig,
}

impl RuleBasedDecider {
    pub fn new(config: RuleBasedConfig) -> Self {
        Self { config }
    }

    fn evaluate(&self, close: f64, indicators: &Indicators) -> Decision {
        let Some(rsi) = indicators.rsi else {
            return Decision::hold("RSI unavailable");
        };

        let band = indicators.bollinger;
        let below_lower = band.map_or(false, |b| close < b.lower);
        let above_upper = band.map_or(false, |b| close > b.upper);

        if rsi < self.config.oversold && below_lower {
            let confidence = ((self.config.oversold - rsi) / self.config.oversold).clamp(0.1, 1.0);
            return Decision::new(
                Action::Buy,
                confidence,
                format!("RSI {:.1} oversold, close below lower band", rsi),
            );
        }

        if rsi > self.config.overbought || above_upper {
            let headroom = 100.0 - self.config.overbought;
            let confidence = if headroom > 0.0 {
                ((rsi - self.config.overbought) / headroom).clamp(0.1, 1.0)
            } else {
                1.0
            };
            return Decision::new(
                Action::Sell,
                confidence,
                format!("RSI {:.1}, close {} upper band", rsi, if above_upper { "above" } else { "within" }),
            );
        }

        Decision::hold(format!("RSI {:.1} neutral", rsi))
    }
}

impl Default for RuleBasedDecider {
    fn default() -> Self {
        Self::new(RuleBasedConfig::default())
    }
}

#[async_trait]
impl Decider for RuleBasedDecider {
    async fn decide(
        &self,
        _symbol: &str,
        latest: &Candle,
        indicators: &Indicators,
        _context: &DecisionContext,
    ) -> Result<Decision> {
        Ok(self.evaluate(latest.close_f64(), indicators))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BollingerBands;

    fn indicators(rsi: f64, lower: f64, upper: f64) -> Indicators {
        Indicators {
            rsi: Some(rsi),
            bollinger: Some(BollingerBands {
                middle: (lower + upper) / 2.0,
                upper,
                lower,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn oversold_below_band_buys() {
        let decider = RuleBasedDecider::default();
        let decision = decider.evaluate(95.0, &indicators(20.0, 96.0, 104.0));
        assert_eq!(decision.action, Action::Buy);
        assert!(decision.confidence > 0.0);
    }

    #[test]
    fn oversold_inside_band_holds() {
        let decider = RuleBasedDecider::default();
        let decision = decider.evaluate(100.0, &indicators(20.0, 96.0, 104.0));
        assert_eq!(decision.action, Action::Hold);
    }

    #[test]
    fn overbought_sells() {
        let decider = RuleBasedDecider::default();
        let decision = decider.evaluate(100.0, &indicators(85.0, 96.0, 104.0));
        assert_eq!(decision.action, Action::Sell);
        assert!((decision.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn missing_rsi_holds() {
        let decider = RuleBasedDecider::default();
        let decision = decider.evaluate(100.0, &Indicators::default());
        assert_eq!(decision.action, Action::Hold);
        assert_eq!(decision.reason, "RSI unavailable");
    }
}
