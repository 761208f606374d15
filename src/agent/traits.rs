use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::domain::{Candle, Decision, Indicators};
use crate::error::Result;

/// Free-form context handed to the oracle (price, risk settings, sentiment)
pub type DecisionContext = HashMap<String, Value>;

/// Decision oracle.
///
/// Treated as opaque and fallible: any error aborts the cycle before
/// anything is mutated.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Decider: Send + Sync {
    async fn decide(
        &self,
        symbol: &str,
        latest: &Candle,
        indicators: &Indicators,
        context: &DecisionContext,
    ) -> Result<Decision>;
}
