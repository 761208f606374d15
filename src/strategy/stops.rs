//! Stop-loss computation
//!
//! Pure functions of [`StopConfig`] plus entry price and ATR. Stops are
//! long-only floors: a position is exited when price falls to or below it.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use tracing::debug;

use crate::config::{StopConfig, StopMode};
use crate::domain::Position;

const DEFAULT_PRESET: &str = "medium";
const FALLBACK_PRESET_PCT: Decimal = dec!(1.0);

pub struct StopManager {
    config: StopConfig,
}

impl StopManager {
    pub fn new(config: StopConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StopConfig {
        &self.config
    }

    pub fn is_trailing_enabled(&self) -> bool {
        self.config.trailing_enabled
    }

    /// Stop for a long entry at `entry` with the given ATR, in the configured mode
    pub fn compute_stop(&self, entry: Decimal, atr: Decimal) -> Decimal {
        let raw = match self.config.mode {
            StopMode::Pct => pct_below(entry, self.config.pct),
            StopMode::Atr => entry - self.config.atr_multiplier * atr,
            StopMode::Volatility => {
                if entry <= Decimal::ZERO {
                    entry - self.config.atr_multiplier * atr
                } else {
                    let relative_vol = atr / entry * dec!(100);
                    let multiplier =
                        self.config.atr_multiplier * (Decimal::ONE + relative_vol / dec!(50));
                    entry - multiplier * atr
                }
            }
        };

        let stop = self.round_to_tick(raw.max(Decimal::ZERO));
        debug!(
            "Stop ({:?}) for entry {} atr {} -> {}",
            self.config.mode, entry, atr, stop
        );
        stop
    }

    /// Percentage-off stop by preset label; unknown labels use `medium`
    pub fn preset_stop(&self, entry: Decimal, label: &str) -> Decimal {
        let pct = self
            .config
            .presets
            .get(&label.to_ascii_lowercase())
            .or_else(|| self.config.presets.get(DEFAULT_PRESET))
            .copied()
            .unwrap_or(FALLBACK_PRESET_PCT);
        self.round_to_tick(pct_below(entry, pct))
    }

    /// Round to the nearest multiple of the tick size; tick <= 0 leaves the value as-is
    pub fn round_to_tick(&self, value: Decimal) -> Decimal {
        let tick = self.config.tick_size;
        if tick <= Decimal::ZERO {
            return value;
        }
        (value / tick).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero) * tick
    }

    /// True iff a long position is open and `price` is at or below `stop`
    pub fn check_stop_loss(
        &self,
        price: Decimal,
        stop: Decimal,
        position: Option<&Position>,
    ) -> bool {
        match position {
            Some(p) if p.quantity > 0 => price <= stop,
            _ => false,
        }
    }

    /// True once the position has been held longer than `max_hold_secs`
    pub fn check_time_based_stop(&self, position: &Position) -> bool {
        self.check_time_based_stop_at(position, Utc::now())
    }

    pub fn check_time_based_stop_at(&self, position: &Position, now: DateTime<Utc>) -> bool {
        position.holding_duration_secs(now) > self.config.max_hold_secs as i64
    }
}

fn pct_below(entry: Decimal, pct: Decimal) -> Decimal {
    entry * (Decimal::ONE - pct / dec!(100))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn manager(mode: StopMode) -> StopManager {
        StopManager::new(StopConfig {
            mode,
            ..StopConfig::default()
        })
    }

    fn position(quantity: u64, entry_time: DateTime<Utc>) -> Position {
        Position {
            symbol: "AAPL".to_string(),
            quantity,
            avg_entry_price: dec!(100),
            stop_price: dec!(95),
            atr: dec!(2),
            entry_time,
        }
    }

    #[test]
    fn atr_stop_rounds_to_tick() {
        let stops = StopManager::new(StopConfig {
            mode: StopMode::Atr,
            atr_multiplier: dec!(1.5),
            tick_size: dec!(0.05),
            ..StopConfig::default()
        });
        assert_eq!(stops.compute_stop(dec!(100), dec!(2)), dec!(97.00));
    }

    #[test]
    fn pct_stop() {
        let stops = StopManager::new(StopConfig {
            mode: StopMode::Pct,
            pct: dec!(2),
            tick_size: Decimal::ZERO,
            ..StopConfig::default()
        });
        assert_eq!(stops.compute_stop(dec!(100), dec!(2)), dec!(98.00));
    }

    #[test]
    fn volatility_stop_widens_with_relative_atr() {
        let stops = StopManager::new(StopConfig {
            mode: StopMode::Volatility,
            atr_multiplier: dec!(1.5),
            tick_size: Decimal::ZERO,
            ..StopConfig::default()
        });
        // relVol = 2%, mult = 1.5 * 1.04 = 1.56, stop = 100 - 3.12
        assert_eq!(stops.compute_stop(dec!(100), dec!(2)), dec!(96.88));

        let fixed = manager(StopMode::Atr).compute_stop(dec!(100), dec!(2));
        assert!(stops.compute_stop(dec!(100), dec!(2)) < fixed);
    }

    #[test]
    fn tick_rounding_goes_to_nearest_multiple() {
        let stops = StopManager::new(StopConfig {
            tick_size: dec!(0.25),
            ..StopConfig::default()
        });
        assert_eq!(stops.round_to_tick(dec!(10.12)), dec!(10.00));
        assert_eq!(stops.round_to_tick(dec!(10.13)), dec!(10.25));
        assert_eq!(stops.round_to_tick(dec!(10.125)), dec!(10.25));

        let unrounded = StopManager::new(StopConfig {
            tick_size: dec!(-1),
            ..StopConfig::default()
        });
        assert_eq!(unrounded.round_to_tick(dec!(10.1234)), dec!(10.1234));
    }

    #[test]
    fn presets_fall_back_to_medium() {
        let stops = manager(StopMode::Atr);
        assert_eq!(stops.preset_stop(dec!(200), "tight"), dec!(199));
        assert_eq!(stops.preset_stop(dec!(200), "WIDE"), dec!(196));
        assert_eq!(stops.preset_stop(dec!(200), "yolo"), dec!(198));
    }

    #[test]
    fn stop_loss_triggers_at_or_below_stop() {
        let stops = manager(StopMode::Atr);
        let pos = position(10, Utc::now());

        assert!(stops.check_stop_loss(dec!(95), dec!(95), Some(&pos)));
        assert!(stops.check_stop_loss(dec!(94), dec!(95), Some(&pos)));
        assert!(!stops.check_stop_loss(dec!(95.01), dec!(95), Some(&pos)));
        assert!(!stops.check_stop_loss(dec!(1), dec!(95), None));
        assert!(!stops.check_stop_loss(dec!(1), dec!(95), Some(&position(0, Utc::now()))));
    }

    #[test]
    fn time_based_stop_after_max_hold() {
        let stops = manager(StopMode::Atr);
        let now = Utc::now();

        let fresh = position(10, now - Duration::seconds(3600));
        assert!(!stops.check_time_based_stop_at(&fresh, now));

        let stale = position(10, now - Duration::seconds(3601));
        assert!(stops.check_time_based_stop_at(&stale, now));
        assert!(stops.check_time_based_stop(&stale));
    }

    #[test]
    fn trailing_flag_follows_config() {
        assert!(manager(StopMode::Atr).is_trailing_enabled());
        let off = StopManager::new(StopConfig {
            trailing_enabled: false,
            ..StopConfig::default()
        });
        assert!(!off.is_trailing_enabled());
    }
}
