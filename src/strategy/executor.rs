use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{Decision, Indicators, OrderRequest, OrderResponse, OrderStatus, OrderTag};
use crate::error::{OrderError, Result, SentinelError};
use crate::exchange::Broker;
use crate::persistence::{AuditSink, DecisionRecord, TradeRecord};

/// Order executor: one broker submission per request, audited on success.
///
/// There is no retry here. A failed order is returned to the engine, which
/// tries again (if at all) on its next cycle.
pub struct OrderExecutor {
    broker: Arc<dyn Broker>,
    audit: Arc<dyn AuditSink>,
}

impl OrderExecutor {
    pub fn new(broker: Arc<dyn Broker>, audit: Arc<dyn AuditSink>) -> Self {
        Self { broker, audit }
    }

    pub async fn buy(
        &self,
        symbol: &str,
        quantity: u64,
        tag: OrderTag,
        price: Decimal,
        decision: &Decision,
    ) -> Result<OrderResponse> {
        self.execute(OrderRequest::buy(symbol, quantity, tag), price, decision)
            .await
    }

    pub async fn sell(
        &self,
        symbol: &str,
        quantity: u64,
        tag: OrderTag,
        price: Decimal,
        decision: &Decision,
    ) -> Result<OrderResponse> {
        self.execute(OrderRequest::sell(symbol, quantity, tag), price, decision)
            .await
    }

    /// Submit `request` and, once the broker confirms it, append a trade record.
    ///
    /// The audit append is synchronous, so a confirmed response reaches the
    /// caller without another suspension point.
    pub async fn execute(
        &self,
        request: OrderRequest,
        price: Decimal,
        decision: &Decision,
    ) -> Result<OrderResponse> {
        if request.quantity == 0 {
            return Err(OrderError::InvalidQuantity { quantity: 0 }.into());
        }

        debug!(
            "Submitting {} {} x{} [{}] ({})",
            request.side, request.symbol, request.quantity, request.tag, request.client_order_id
        );

        let response = self
            .broker
            .place_order(&request)
            .await
            .map_err(|e| match e {
                e @ (SentinelError::Order(_) | SentinelError::Cancelled) => e,
                other => OrderError::Broker(other.to_string()).into(),
            })?;

        check_status(&response)?;

        info!(
            "Order {} {} {} x{} @ {} [{}] status {:?}",
            response.order_id,
            request.side,
            request.symbol,
            request.quantity,
            price,
            request.tag,
            response.status
        );

        let record = TradeRecord {
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price,
            order_id: response.order_id.clone(),
            tag: request.tag,
            reason: decision.reason.clone(),
            confidence: decision.confidence,
        };
        if let Err(e) = self.audit.append_trade(&record) {
            // The fill stands; only the audit line is lost
            error!(
                "Failed to audit {} order {} for {}: {}",
                record.side, record.order_id, record.symbol, e
            );
        }

        Ok(response)
    }

    /// Append the cycle's decision record; failures are logged only
    pub fn log_decision(
        &self,
        symbol: &str,
        decision: &Decision,
        price: Decimal,
        indicators: &Indicators,
    ) {
        let record = DecisionRecord {
            symbol: symbol.to_string(),
            action: decision.action,
            confidence: decision.confidence,
            reason: decision.reason.clone(),
            price,
            indicators: indicators.clone(),
        };
        if let Err(e) = self.audit.append_decision(&record) {
            warn!("Failed to audit decision for {}: {}", symbol, e);
        }
    }
}

fn check_status(response: &OrderResponse) -> Result<()> {
    match response.status {
        OrderStatus::Cancelled => Err(OrderError::CancelledByBroker {
            order_id: response.order_id.clone(),
        }
        .into()),
        status if status.is_failure() => Err(OrderError::Rejected {
            order_id: response.order_id.clone(),
            message: if response.message.is_empty() {
                format!("{:?}", status)
            } else {
                response.message.clone()
            },
        }
        .into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Action, OrderSide};
    use crate::exchange::MockBroker;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Default)]
    struct RecordingSink {
        trades: Mutex<Vec<TradeRecord>>,
        decisions: Mutex<Vec<DecisionRecord>>,
        fail: bool,
    }

    impl AuditSink for RecordingSink {
        fn append_trade(&self, record: &TradeRecord) -> Result<()> {
            if self.fail {
                return Err(SentinelError::Internal("disk full".to_string()));
            }
            self.trades.lock().unwrap().push(record.clone());
            Ok(())
        }

        fn append_decision(&self, record: &DecisionRecord) -> Result<()> {
            self.decisions.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn filled(order_id: &str) -> OrderResponse {
        OrderResponse {
            order_id: order_id.to_string(),
            status: OrderStatus::Filled,
            message: String::new(),
        }
    }

    fn decision() -> Decision {
        Decision::new(Action::Buy, 0.8, "oversold bounce")
    }

    #[tokio::test]
    async fn fill_is_audited_with_tag_and_reason() {
        let mut broker = MockBroker::new();
        broker
            .expect_place_order()
            .withf(|req| req.symbol == "AAPL" && req.quantity == 10 && req.side == OrderSide::Buy)
            .times(1)
            .returning(|_| Ok(filled("ord-1")));

        let sink = Arc::new(RecordingSink::default());
        let executor = OrderExecutor::new(Arc::new(broker), sink.clone());

        let response = assert_ok!(
            executor
                .buy("aapl", 10, OrderTag::Llm, dec!(187.5), &decision())
                .await
        );
        assert_eq!(response.order_id, "ord-1");

        let trades = sink.trades.lock().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].tag, OrderTag::Llm);
        assert_eq!(trades[0].price, dec!(187.5));
        assert_eq!(trades[0].reason, "oversold bounce");
    }

    #[tokio::test]
    async fn broker_error_is_not_audited_or_retried() {
        let mut broker = MockBroker::new();
        broker
            .expect_place_order()
            .times(1)
            .returning(|_| Err(SentinelError::Internal("connection reset".to_string())));

        let sink = Arc::new(RecordingSink::default());
        let executor = OrderExecutor::new(Arc::new(broker), sink.clone());

        let err = assert_err!(
            executor
                .sell("AAPL", 5, OrderTag::StopLoss, dec!(94), &decision())
                .await
        );
        assert!(matches!(err, SentinelError::Order(ref m) if m.contains("connection reset")));
        assert!(sink.trades.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejected_status_is_an_order_error() {
        let mut broker = MockBroker::new();
        broker.expect_place_order().returning(|_| {
            Ok(OrderResponse {
                order_id: "ord-9".to_string(),
                status: OrderStatus::Rejected,
                message: "insufficient buying power".to_string(),
            })
        });

        let sink = Arc::new(RecordingSink::default());
        let executor = OrderExecutor::new(Arc::new(broker), sink.clone());

        let err = executor
            .buy("AAPL", 10, OrderTag::Llm, dec!(100), &decision())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("insufficient buying power"));
        assert!(sink.trades.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn audit_failure_does_not_fail_the_fill() {
        let mut broker = MockBroker::new();
        broker
            .expect_place_order()
            .returning(|_| Ok(filled("ord-2")));

        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::default()
        });
        let executor = OrderExecutor::new(Arc::new(broker), sink);

        assert_ok!(
            executor
                .buy("AAPL", 1, OrderTag::Llm, dec!(100), &decision())
                .await
        );
    }

    #[tokio::test]
    async fn zero_quantity_never_reaches_broker() {
        let mut broker = MockBroker::new();
        broker.expect_place_order().never();

        let executor = OrderExecutor::new(Arc::new(broker), Arc::new(RecordingSink::default()));
        assert!(executor
            .buy("AAPL", 0, OrderTag::Llm, dec!(100), &decision())
            .await
            .is_err());
    }

    #[test]
    fn decision_record_carries_indicators() {
        let sink = Arc::new(RecordingSink::default());
        let executor = OrderExecutor::new(Arc::new(MockBroker::new()), sink.clone());

        let indicators = Indicators {
            rsi: Some(28.5),
            atr: Some(1.9),
            ..Indicators::default()
        };
        executor.log_decision("AAPL", &Decision::hold("flat"), dec!(101), &indicators);

        let decisions = sink.decisions.lock().unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].action, Action::Hold);
        assert_eq!(decisions[0].indicators.rsi, Some(28.5));
    }
}
