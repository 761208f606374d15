use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Action chosen by the decision oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Action {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Action::Buy),
            "SELL" => Ok(Action::Sell),
            "HOLD" => Ok(Action::Hold),
            _ => Err("invalid action; expected BUY|SELL|HOLD"),
        }
    }
}

/// Oracle output for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub reason: String,
    /// Explicit quantity override; zero means "not specified"
    #[serde(default)]
    pub quantity: Option<u64>,
}

impl Decision {
    pub fn new(action: Action, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            action,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
            quantity: None,
        }
    }

    pub fn hold(reason: impl Into<String>) -> Self {
        Self::new(Action::Hold, 0.0, reason)
    }

    pub fn with_quantity(mut self, quantity: u64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Oracle-provided quantity, if it is a usable positive number
    pub fn explicit_quantity(&self) -> Option<u64> {
        self.quantity.filter(|q| *q > 0)
    }
}
