//! Decision oracle boundary
//!
//! The engine only sees the [`Decider`] trait; the rule-based decider is the
//! built-in implementation for paper trading.

pub mod rule_based;
mod traits;

pub use rule_based::{RuleBasedConfig, RuleBasedDecider};
pub use traits::{Decider, DecisionContext};

#[cfg(test)]
pub use traits::MockDecider;
