use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Origin of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderTag {
    /// Oracle-driven trade
    #[serde(rename = "LLM")]
    Llm,
    /// Forced stop-loss exit
    #[serde(rename = "SL")]
    StopLoss,
}

impl OrderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderTag::Llm => "LLM",
            OrderTag::StopLoss => "SL",
        }
    }
}

impl std::fmt::Display for OrderTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order status as reported by the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Order accepted, not yet filled
    Submitted,
    /// Order partially filled
    PartiallyFilled,
    /// Order fully filled
    Filled,
    /// Order cancelled
    Cancelled,
    /// Order rejected by broker
    Rejected,
    /// Order failed (broker-side error)
    Failed,
}

impl OrderStatus {
    /// Statuses that mean the order did not go through
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Failed
        )
    }
}

/// Market order request (what we want to do)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub client_order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u64,
    pub tag: OrderTag,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: OrderSide, quantity: u64, tag: OrderTag) -> Self {
        Self {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: symbol.trim().to_ascii_uppercase(),
            side,
            quantity,
            tag,
        }
    }

    pub fn buy(symbol: &str, quantity: u64, tag: OrderTag) -> Self {
        Self::market(symbol, OrderSide::Buy, quantity, tag)
    }

    pub fn sell(symbol: &str, quantity: u64, tag: OrderTag) -> Self {
        Self::market(symbol, OrderSide::Sell, quantity, tag)
    }
}

/// Broker acknowledgement of an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_request_normalizes_symbol() {
        let req = OrderRequest::sell(" msft ", 5, OrderTag::StopLoss);
        assert_eq!(req.symbol, "MSFT");
        assert_eq!(req.side, OrderSide::Sell);
        assert_eq!(req.tag.as_str(), "SL");
        assert!(!req.client_order_id.is_empty());
    }

    #[test]
    fn tag_serializes_to_wire_names() {
        assert_eq!(serde_json::to_string(&OrderTag::Llm).unwrap(), "\"LLM\"");
        assert_eq!(serde_json::to_string(&OrderTag::StopLoss).unwrap(), "\"SL\"");
    }
}
