use thiserror::Error;

/// Main error type for the trading engine
#[derive(Error, Debug)]
pub enum SentinelError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Insufficient data for {symbol}: got {got} candles, need {need}")]
    InsufficientData {
        symbol: String,
        got: usize,
        need: usize,
    },

    #[error("Candle fetch failed: {0}")]
    Fetch(String),

    // Decision oracle errors
    #[error("Decision oracle failed: {0}")]
    Oracle(String),

    // Order execution errors
    #[error("Order failed: {0}")]
    Order(String),

    // Enrichment errors (never fatal to a cycle)
    #[error("Sentiment unavailable: {0}")]
    Sentiment(String),

    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout {
        operation: &'static str,
        elapsed_ms: u64,
    },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SentinelError {
    /// Reclassify a collaborator failure as a candle-fetch failure.
    ///
    /// Cancellation and the structured insufficient-data error pass through.
    pub fn into_fetch(self) -> Self {
        match self {
            e @ (SentinelError::Cancelled
            | SentinelError::Fetch(_)
            | SentinelError::InsufficientData { .. }) => e,
            other => SentinelError::Fetch(other.to_string()),
        }
    }

    /// Reclassify a collaborator failure as an oracle failure.
    pub fn into_oracle(self) -> Self {
        match self {
            e @ (SentinelError::Cancelled | SentinelError::Oracle(_)) => e,
            other => SentinelError::Oracle(other.to_string()),
        }
    }

    /// True for errors that abort a cycle before any state mutation.
    pub fn is_cycle_abort(&self) -> bool {
        matches!(
            self,
            SentinelError::Fetch(_)
                | SentinelError::InsufficientData { .. }
                | SentinelError::Oracle(_)
                | SentinelError::Cancelled
        )
    }
}

/// Result type alias for SentinelError
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Broker-side order failures
#[derive(Error, Debug, Clone)]
pub enum OrderError {
    #[error("Order rejected by broker: {message}")]
    Rejected { order_id: String, message: String },

    #[error("Order cancelled by broker: {order_id}")]
    CancelledByBroker { order_id: String },

    #[error("Invalid order quantity: {quantity}")]
    InvalidQuantity { quantity: u64 },

    #[error("Broker error: {0}")]
    Broker(String),
}

impl From<OrderError> for SentinelError {
    fn from(err: OrderError) -> Self {
        SentinelError::Order(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_reclassification_keeps_structured_errors() {
        let err = SentinelError::InsufficientData {
            symbol: "AAPL".to_string(),
            got: 10,
            need: 50,
        }
        .into_fetch();
        assert!(matches!(err, SentinelError::InsufficientData { got: 10, .. }));

        let err = SentinelError::Internal("socket closed".to_string()).into_fetch();
        assert!(matches!(err, SentinelError::Fetch(ref m) if m.contains("socket closed")));

        assert!(matches!(
            SentinelError::Cancelled.into_oracle(),
            SentinelError::Cancelled
        ));
    }

    #[test]
    fn order_error_converts_to_order_variant() {
        let err: SentinelError = OrderError::Rejected {
            order_id: "abc".to_string(),
            message: "insufficient buying power".to_string(),
        }
        .into();
        assert!(!err.is_cycle_abort());
        assert!(err.to_string().contains("insufficient buying power"));
    }
}
