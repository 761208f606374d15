use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// Result of a pre-trade exposure check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RiskCheck {
    pub exceeded: bool,
    /// price * quantity; zero when the check is disabled
    pub exposure: Decimal,
    /// Exposure as % of account value; zero when not evaluated
    pub exposure_pct: Decimal,
}

impl RiskCheck {
    fn disabled() -> Self {
        Self {
            exceeded: false,
            exposure: Decimal::ZERO,
            exposure_pct: Decimal::ZERO,
        }
    }
}

/// Per-trade exposure gate for entries.
///
/// The account value is an injected baseline; nothing here fetches real
/// equity, so the gate is only as accurate as whoever calls
/// [`RiskManager::set_account_value`].
pub struct RiskManager {
    account_value: RwLock<Decimal>,
}

impl RiskManager {
    pub fn new(account_value: Decimal) -> Self {
        Self {
            account_value: RwLock::new(account_value),
        }
    }

    pub fn account_value(&self) -> Decimal {
        *self
            .account_value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_account_value(&self, value: Decimal) {
        *self
            .account_value
            .write()
            .unwrap_or_else(PoisonError::into_inner) = value;
        debug!("Account value baseline set to {}", value);
    }

    /// Check a prospective buy.
    ///
    /// `max_risk_pct <= 0` disables the check. Otherwise the trade is
    /// blocked when `price * quantity / account_value * 100` is strictly
    /// greater than `max_risk_pct`.
    pub fn validate_trade(
        &self,
        symbol: &str,
        price: Decimal,
        quantity: u64,
        max_risk_pct: Decimal,
    ) -> RiskCheck {
        if max_risk_pct <= Decimal::ZERO {
            return RiskCheck::disabled();
        }

        let exposure = price * Decimal::from(quantity);
        let account_value = self.account_value();

        if account_value <= Decimal::ZERO {
            warn!(
                "{}: account value {} is not positive, blocking exposure {}",
                symbol, account_value, exposure
            );
            return RiskCheck {
                exceeded: true,
                exposure,
                exposure_pct: Decimal::ZERO,
            };
        }

        let exposure_pct = exposure / account_value * dec!(100);
        let exceeded = exposure_pct > max_risk_pct;

        if exceeded {
            warn!(
                "{}: exposure {} ({:.2}% of {}) exceeds max {}%",
                symbol, exposure, exposure_pct, account_value, max_risk_pct
            );
        } else {
            debug!(
                "{}: exposure {} ({:.2}%) within {}%",
                symbol, exposure, exposure_pct, max_risk_pct
            );
        }

        RiskCheck {
            exceeded,
            exposure,
            exposure_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_when_max_risk_not_positive() {
        let risk = RiskManager::new(dec!(1000));
        for max in [dec!(0), dec!(-5)] {
            let check = risk.validate_trade("AAPL", dec!(500), 1000, max);
            assert!(!check.exceeded);
            assert_eq!(check.exposure, Decimal::ZERO);
        }
    }

    #[test]
    fn boundary_is_strict() {
        let risk = RiskManager::new(dec!(10000));

        // 100 * 2 = 200 -> exactly 2%
        let check = risk.validate_trade("AAPL", dec!(100), 2, dec!(2));
        assert!(!check.exceeded);
        assert_eq!(check.exposure, dec!(200));
        assert_eq!(check.exposure_pct, dec!(2));

        // 100.01 * 2 -> just over 2%
        let check = risk.validate_trade("AAPL", dec!(100.01), 2, dec!(2));
        assert!(check.exceeded);
    }

    #[test]
    fn account_value_is_mutable() {
        let risk = RiskManager::new(dec!(10000));
        assert!(risk.validate_trade("AAPL", dec!(100), 5, dec!(2)).exceeded);

        risk.set_account_value(dec!(50000));
        assert_eq!(risk.account_value(), dec!(50000));
        assert!(!risk.validate_trade("AAPL", dec!(100), 5, dec!(2)).exceeded);
    }

    #[test]
    fn non_positive_account_blocks_when_enabled() {
        let risk = RiskManager::new(Decimal::ZERO);
        let check = risk.validate_trade("AAPL", dec!(1), 1, dec!(2));
        assert!(check.exceeded);
        assert_eq!(check.exposure, dec!(1));
    }
}
