//! End-to-end lifecycle scenarios against the in-memory stack

mod common;

use async_trait::async_trait;
use common::{harness, harness_with_risk, limit_buy, limit_buy_with};
use broker_connector::{CircuitState, ZERODHA};
use chrono::Duration;
use oms::{FillEvent, OrderStatus, RiskApproval, RiskGate, ValidatedRequest};
use pretty_assertions::assert_eq;
use services_common::{BrokerError, Px, Qty, TimeInForce, TradeError, TradeResult};
use std::sync::Arc;

#[tokio::test]
async fn happy_path_limit_buy_is_acknowledged() {
    let h = harness();
    let mut events = h.engine.subscribe();

    let response = h.engine.place_order(limit_buy(), 7).await.unwrap();

    assert_eq!(response.status, OrderStatus::Acknowledged);
    assert!(response.broker_order_id.is_some());
    let broker = response.broker_name.clone().unwrap();
    assert!(["ZERODHA", "UPSTOX", "ANGEL_ONE"].contains(&broker.as_str()));
    assert_eq!(response.quantity, 100);
    assert_eq!(response.remaining_quantity, 100);
    assert!(response.submitted_at.is_some());

    assert_eq!(
        h.metrics
            .counter("trading.orders.placed", &[("broker", &broker)]),
        1
    );
    assert_eq!(h.metrics.gauge("trading.orders.active", &[]), 1);

    // Created first, then the Pending -> Acknowledged change
    assert!(matches!(events.try_recv().unwrap(), oms::OrderEvent::Created(_)));
    assert!(matches!(
        events.try_recv().unwrap(),
        oms::OrderEvent::StatusChanged {
            new_status: OrderStatus::Acknowledged,
            ..
        }
    ));
}

#[tokio::test]
async fn large_limit_order_places_successfully() {
    let h = harness();
    let response = h
        .engine
        .place_order(limit_buy_with("RELIANCE", 15_000, TimeInForce::Day), 7)
        .await
        .unwrap();
    assert_eq!(response.status, OrderStatus::Acknowledged);
    assert_eq!(response.quantity, 15_000);
}

#[tokio::test]
async fn partial_then_full_fill_converges() {
    let h = harness();
    let placed = h.engine.place_order(limit_buy(), 7).await.unwrap();

    let partial = h
        .engine
        .process_order_fill(
            &placed.order_id,
            FillEvent {
                execution_id: "EXE-1".to_string(),
                quantity: Qty::from_units(50),
                price: Px::from_paise(245_500),
                sequence: Some(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(partial.status, OrderStatus::PartiallyFilled);
    assert_eq!(partial.filled_quantity, 50);
    assert_eq!(partial.remaining_quantity, 50);

    let full = h
        .engine
        .process_order_fill(
            &placed.order_id,
            FillEvent {
                execution_id: "EXE-2".to_string(),
                quantity: Qty::from_units(50),
                price: Px::from_paise(246_000),
                sequence: Some(2),
            },
        )
        .await
        .unwrap();
    assert_eq!(full.status, OrderStatus::Filled);
    assert_eq!(full.filled_quantity, 100);
    assert_eq!(full.average_price, Px::from_paise(245_750));
    assert!(full.executed_at.is_some());
    assert_eq!(h.metrics.gauge("trading.orders.active", &[]), 0);
}

#[tokio::test]
async fn redelivered_fill_sequence_is_dropped() {
    let h = harness();
    let placed = h.engine.place_order(limit_buy(), 7).await.unwrap();
    let fill = FillEvent {
        execution_id: "EXE-1".to_string(),
        quantity: Qty::from_units(30),
        price: Px::from_paise(245_000),
        sequence: Some(1),
    };

    h.engine
        .process_order_fill(&placed.order_id, fill.clone())
        .await
        .unwrap();
    // Redelivery of the same sequence leaves the totals alone
    let after = h
        .engine
        .process_order_fill(&placed.order_id, fill)
        .await
        .unwrap();
    assert_eq!(after.filled_quantity, 30);
    assert_eq!(after.status, OrderStatus::PartiallyFilled);
}

#[tokio::test]
async fn modify_of_a_filled_order_is_rejected() {
    let h = harness();
    let placed = h.engine.place_order(limit_buy(), 7).await.unwrap();
    h.engine
        .process_order_fill(
            &placed.order_id,
            FillEvent {
                execution_id: "EXE-1".to_string(),
                quantity: Qty::from_units(100),
                price: Px::from_paise(245_075),
                sequence: Some(1),
            },
        )
        .await
        .unwrap();

    let mut modification = limit_buy();
    modification.limit_price = Some(Px::from_paise(246_000));
    let err = h
        .engine
        .modify_order(&placed.order_id, modification, 7)
        .await
        .unwrap_err();
    match err {
        TradeError::OrderRejected { reason, .. } => assert_eq!(reason, "non-modifiable state"),
        other => panic!("expected OrderRejected, got {other:?}"),
    }
}

#[tokio::test]
async fn modify_updates_price_and_quantity() {
    let h = harness();
    let placed = h.engine.place_order(limit_buy(), 7).await.unwrap();

    let mut modification = limit_buy();
    modification.quantity = 150;
    modification.limit_price = Some(Px::from_paise(244_000));
    let modified = h
        .engine
        .modify_order(&placed.order_id, modification, 7)
        .await
        .unwrap();

    assert_eq!(modified.quantity, 150);
    assert_eq!(modified.limit_price, Some(Px::from_paise(244_000)));
    assert_eq!(modified.status, OrderStatus::Acknowledged);
}

struct BlockEverything;

#[async_trait]
impl RiskGate for BlockEverything {
    async fn assess(&self, _request: &ValidatedRequest, _user_id: i64) -> TradeResult<RiskApproval> {
        Err(TradeError::Risk {
            reason: "daily loss limit reached".to_string(),
            risk_level: "HIGH".to_string(),
        })
    }
}

#[tokio::test]
async fn risk_decline_stops_placement_before_persisting() {
    let h = harness_with_risk(Arc::new(BlockEverything));
    let err = h.engine.place_order(limit_buy(), 7).await.unwrap_err();
    match err {
        TradeError::Risk { risk_level, .. } => assert_eq!(risk_level, "HIGH"),
        other => panic!("expected risk decline, got {other:?}"),
    }
    assert!(h.repository.is_empty());
    assert_eq!(
        h.metrics
            .counter("trading.orders.failed", &[("error_type", "RISK_DECLINED")]),
        1
    );
}

#[tokio::test]
async fn invalid_request_is_rejected_without_persisting() {
    let h = harness();
    let mut bad = limit_buy();
    bad.symbol = String::new();
    bad.quantity = 0;

    let err = h.engine.place_order(bad, 7).await.unwrap_err();
    assert!(matches!(err, TradeError::Validation { .. }));
    assert!(h.repository.is_empty());
    assert_eq!(
        h.metrics.counter(
            "trading.orders.failed",
            &[("error_type", "VALIDATION_FAILED")]
        ),
        1
    );
    assert_eq!(h.metrics.gauge("trading.orders.active", &[]), 0);
}

#[tokio::test]
async fn open_circuit_degrades_cancel_then_reconciles() {
    let h = harness();
    let placed = h.engine.place_order(limit_buy(), 7).await.unwrap();
    assert_eq!(placed.broker_name.as_deref(), Some(ZERODHA));

    // Five straight timeouts open Zerodha's breaker
    h.paper[ZERODHA].fail_next(5, BrokerError::Timeout { timeout_ms: 1000 });
    for _ in 0..5 {
        let err = h.engine.cancel_order(&placed.order_id, 7).await.unwrap_err();
        assert!(matches!(err, TradeError::Broker(BrokerError::Timeout { .. })));
    }
    assert_eq!(
        h.engine.gateway().breaker_state(ZERODHA),
        CircuitState::Open
    );

    // With the breaker open the cancel degrades instead of failing
    let degraded = h.engine.cancel_order(&placed.order_id, 7).await.unwrap();
    assert!(degraded.degraded);
    assert_eq!(degraded.status, OrderStatus::CancelPending);

    // After the open window the reconciler confirms the cancel
    h.clock.advance(Duration::seconds(31));
    let reconciled = h.engine.reconcile_cancels().await.unwrap();
    assert_eq!(reconciled, 1);

    let current = h.engine.get_order(&placed.order_id, 7).await.unwrap();
    assert_eq!(current.status, OrderStatus::Cancelled);
    assert!(!current.degraded);
}

#[tokio::test]
async fn day_orders_expire_and_gtc_survives() {
    let h = harness();
    let day = h
        .engine
        .place_order(limit_buy_with("RELIANCE", 100, TimeInForce::Day), 7)
        .await
        .unwrap();
    let gtc = h
        .engine
        .place_order(limit_buy_with("INFY", 50, TimeInForce::Gtc), 7)
        .await
        .unwrap();

    // Inside the session nothing expires
    assert_eq!(h.engine.expire_orders().await.unwrap(), 0);

    // Jump past the 15:30 IST close
    h.clock.advance(Duration::hours(6));
    let expired = h.engine.expire_orders().await.unwrap();
    assert_eq!(expired, 1);

    let day_now = h.engine.get_order(&day.order_id, 7).await.unwrap();
    assert_eq!(day_now.status, OrderStatus::Expired);
    let gtc_now = h.engine.get_order(&gtc.order_id, 7).await.unwrap();
    assert_eq!(gtc_now.status, OrderStatus::Acknowledged);
}

#[tokio::test]
async fn failed_submit_persists_the_rejection() {
    let h = harness();
    // Reject the submit so the order never reaches a broker
    h.paper[ZERODHA].fail_next(
        1,
        BrokerError::Rejected {
            reason: "rms limit".to_string(),
        },
    );
    let err = h.engine.place_order(limit_buy(), 7).await.unwrap_err();
    assert!(matches!(err, TradeError::Broker(BrokerError::Rejected { .. })));

    // The persisted order carries the rejection
    let orders = h.engine.get_orders_by_user(7, Default::default()).await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Rejected);
    assert!(orders[0].rejection_reason.is_some());
}

#[tokio::test]
async fn queries_are_scoped_to_the_owner() {
    let h = harness();
    let placed = h.engine.place_order(limit_buy(), 7).await.unwrap();

    let err = h.engine.get_order(&placed.order_id, 8).await.unwrap_err();
    assert!(matches!(err, TradeError::NotFound { .. }));

    assert!(h.engine.get_orders_by_user(8, Default::default()).await.unwrap().is_empty());
    assert_eq!(h.engine.get_active_orders(7).await.unwrap().len(), 1);
    assert_eq!(
        h.engine
            .get_orders_by_user_and_status(7, OrderStatus::Acknowledged)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn terminal_orders_refuse_every_operation() {
    let h = harness();
    let placed = h.engine.place_order(limit_buy(), 7).await.unwrap();
    h.engine.cancel_order(&placed.order_id, 7).await.unwrap();

    let cancel_again = h.engine.cancel_order(&placed.order_id, 7).await.unwrap_err();
    assert!(matches!(cancel_again, TradeError::OrderRejected { .. }));

    let modify = h
        .engine
        .modify_order(&placed.order_id, limit_buy(), 7)
        .await
        .unwrap_err();
    assert!(matches!(modify, TradeError::OrderRejected { .. }));
}
