//! Position Manager
//!
//! Owns the per-symbol open-position book:
//! - at most one long position per symbol
//! - weighted-average entry on additions, unchanged on reductions
//! - stop price only ever ratchets up
//!
//! The whole book sits behind one coarse lock. Every method takes the lock,
//! mutates, and releases it without awaiting, so a fill confirmed by the
//! broker is committed in the same synchronous stretch that observed it.
//!
//! State is in-memory only: a restart loses open-position bookkeeping
//! without reconciling against the broker.

use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::domain::Position;

/// Outcome of a sell against the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SellOutcome {
    /// Quantity actually taken off the position (clamped to what was held)
    pub quantity: u64,
    /// (price - avg entry) * quantity
    pub realized_pnl: Decimal,
    /// Position was removed by this sell
    pub closed: bool,
}

#[derive(Debug, Default)]
pub struct PositionManager {
    positions: Mutex<HashMap<String, Position>>,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn book(&self) -> MutexGuard<'_, HashMap<String, Position>> {
        // Poisoning only means another cycle panicked mid-log; the map is intact
        self.positions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, symbol: &str) -> Option<Position> {
        self.book().get(symbol).cloned()
    }

    pub fn has(&self, symbol: &str) -> bool {
        self.book().contains_key(symbol)
    }

    /// All open positions, sorted by symbol
    pub fn snapshot(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.book().values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    /// Record a confirmed buy.
    ///
    /// Opens the position on first fill; later fills average in, refresh the
    /// ATR and raise the stop to `max(existing, stop_price)`. Entry time is
    /// kept from the opening fill.
    pub fn add_buy(
        &self,
        symbol: &str,
        quantity: u64,
        price: Decimal,
        atr: Decimal,
        stop_price: Decimal,
    ) -> Position {
        let mut book = self.book();

        match book.get_mut(symbol) {
            Some(existing) => {
                let old_qty = Decimal::from(existing.quantity);
                let add_qty = Decimal::from(quantity);
                existing.avg_entry_price =
                    (existing.avg_entry_price * old_qty + price * add_qty) / (old_qty + add_qty);
                existing.quantity += quantity;
                existing.atr = atr;
                if stop_price > existing.stop_price {
                    existing.stop_price = stop_price;
                }

                info!(
                    "Added to {}: +{} @ {} -> {} @ avg {:.4}, stop {}",
                    symbol,
                    quantity,
                    price,
                    existing.quantity,
                    existing.avg_entry_price,
                    existing.stop_price
                );
                existing.clone()
            }
            None => {
                let position = Position {
                    symbol: symbol.to_string(),
                    quantity,
                    avg_entry_price: price,
                    stop_price,
                    atr,
                    entry_time: Utc::now(),
                };
                info!(
                    "Opened {}: {} @ {}, stop {}",
                    symbol, quantity, price, stop_price
                );
                book.insert(symbol.to_string(), position.clone());
                position
            }
        }
    }

    /// Record a confirmed sell.
    ///
    /// Returns `None` when no position is held. Overselling is clamped to
    /// the held quantity; P&L is booked on the clamped quantity.
    pub fn reduce_sell(&self, symbol: &str, quantity: u64, price: Decimal) -> Option<SellOutcome> {
        let mut book = self.book();
        let position = book.get_mut(symbol)?;

        let sold = if quantity > position.quantity {
            warn!(
                "Sell of {} {} exceeds held {}; clamping",
                quantity, symbol, position.quantity
            );
            position.quantity
        } else {
            quantity
        };

        let realized_pnl = (price - position.avg_entry_price) * Decimal::from(sold);
        position.quantity -= sold;
        let closed = position.quantity == 0;

        info!(
            "Reduced {}: -{} @ {} | realized PnL {:.2} | remaining {}",
            symbol, sold, price, realized_pnl, position.quantity
        );

        if closed {
            book.remove(symbol);
            debug!("Position {} closed", symbol);
        }

        Some(SellOutcome {
            quantity: sold,
            realized_pnl,
            closed,
        })
    }

    /// Unconditional removal, used by the forced stop-loss exit
    pub fn close(&self, symbol: &str) -> Option<Position> {
        let removed = self.book().remove(symbol);
        if let Some(ref p) = removed {
            info!("Closed {} ({} @ avg {})", symbol, p.quantity, p.avg_entry_price);
        }
        removed
    }

    /// Ratchet the stop up to `new_stop`; ATR is refreshed either way.
    ///
    /// Returns true when the stop moved.
    pub fn update_trailing_stop(&self, symbol: &str, new_stop: Decimal, atr: Decimal) -> bool {
        let mut book = self.book();
        let Some(position) = book.get_mut(symbol) else {
            return false;
        };

        position.atr = atr;
        if new_stop > position.stop_price {
            debug!(
                "Trailing stop {}: {} -> {}",
                symbol, position.stop_price, new_stop
            );
            position.stop_price = new_stop;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn sequential_buys_weight_the_average() {
        let pm = PositionManager::new();
        pm.add_buy("AAPL", 10, dec!(100), dec!(2), dec!(97));
        let pos = pm.add_buy("AAPL", 30, dec!(120), dec!(3), dec!(115));

        // (100*10 + 120*30) / 40 = 115
        assert_eq!(pos.avg_entry_price, dec!(115));
        assert_eq!(pos.quantity, 40);
        assert_eq!(pos.atr, dec!(3));
        assert_eq!(pos.stop_price, dec!(115));
    }

    #[test]
    fn add_buy_never_lowers_stop_or_resets_entry_time() {
        let pm = PositionManager::new();
        let first = pm.add_buy("AAPL", 10, dec!(100), dec!(2), dec!(97));
        let second = pm.add_buy("AAPL", 10, dec!(90), dec!(2), dec!(87));

        assert_eq!(second.stop_price, dec!(97));
        assert_eq!(second.entry_time, first.entry_time);
        assert_eq!(second.avg_entry_price, dec!(95));
    }

    #[test]
    fn partial_sell_keeps_average() {
        let pm = PositionManager::new();
        pm.add_buy("AAPL", 10, dec!(100), dec!(2), dec!(97));

        let outcome = pm.reduce_sell("AAPL", 4, dec!(105)).unwrap();
        assert_eq!(outcome.quantity, 4);
        assert_eq!(outcome.realized_pnl, dec!(20));
        assert!(!outcome.closed);

        let pos = pm.get("AAPL").unwrap();
        assert_eq!(pos.quantity, 6);
        assert_eq!(pos.avg_entry_price, dec!(100));
    }

    #[test]
    fn full_sell_removes_position() {
        let pm = PositionManager::new();
        pm.add_buy("AAPL", 10, dec!(100), dec!(2), dec!(97));

        let outcome = pm.reduce_sell("AAPL", 10, dec!(110)).unwrap();
        assert_eq!(outcome.realized_pnl, dec!(100));
        assert!(outcome.closed);
        assert!(!pm.has("AAPL"));
    }

    #[test]
    fn oversell_is_clamped_to_held_quantity() {
        let pm = PositionManager::new();
        pm.add_buy("AAPL", 5, dec!(100), dec!(2), dec!(97));

        let outcome = pm.reduce_sell("AAPL", 8, dec!(90)).unwrap();
        assert_eq!(outcome.quantity, 5);
        assert_eq!(outcome.realized_pnl, dec!(-50));
        assert!(outcome.closed);
        assert!(pm.get("AAPL").is_none());
    }

    #[test]
    fn sell_without_position_is_none() {
        let pm = PositionManager::new();
        assert!(pm.reduce_sell("AAPL", 1, dec!(100)).is_none());
    }

    #[test]
    fn trailing_stop_only_moves_up() {
        let pm = PositionManager::new();
        pm.add_buy("AAPL", 10, dec!(100), dec!(2), dec!(97));

        assert!(pm.update_trailing_stop("AAPL", dec!(99), dec!(2.5)));
        assert!(!pm.update_trailing_stop("AAPL", dec!(98), dec!(1.5)));

        let pos = pm.get("AAPL").unwrap();
        assert_eq!(pos.stop_price, dec!(99));
        // ATR refreshed even when the stop did not move
        assert_eq!(pos.atr, dec!(1.5));

        assert!(!pm.update_trailing_stop("MSFT", dec!(50), dec!(1)));
    }

    #[test]
    fn stop_is_monotonic_across_mixed_updates() {
        let pm = PositionManager::new();
        pm.add_buy("AAPL", 10, dec!(100), dec!(2), dec!(97));

        let updates = [dec!(96), dec!(98), dec!(95), dec!(99.5), dec!(99)];
        let mut last = pm.get("AAPL").unwrap().stop_price;
        for (i, stop) in updates.iter().enumerate() {
            if i % 2 == 0 {
                pm.update_trailing_stop("AAPL", *stop, dec!(2));
            } else {
                pm.add_buy("AAPL", 1, dec!(100), dec!(2), *stop);
            }
            let current = pm.get("AAPL").unwrap().stop_price;
            assert!(current >= last);
            last = current;
        }
        assert_eq!(last, dec!(99.5));
    }

    #[test]
    fn close_removes_unconditionally() {
        let pm = PositionManager::new();
        pm.add_buy("AAPL", 10, dec!(100), dec!(2), dec!(97));
        let closed = pm.close("AAPL").unwrap();
        assert_eq!(closed.quantity, 10);
        assert!(pm.close("AAPL").is_none());
        assert!(pm.snapshot().is_empty());
    }
}
