//! Concurrent placement and fill-merge properties

mod common;

use common::{harness, limit_buy_with};
use oms::{FillEvent, OrderStatus};
use pretty_assertions::assert_eq;
use services_common::{Px, Qty, TimeInForce};
use std::collections::HashSet;

#[tokio::test]
async fn hundred_concurrent_placements_all_land() {
    let h = harness();

    let mut tasks = Vec::new();
    for user in 0..100i64 {
        let engine = h.engine.clone();
        let request = limit_buy_with(&format!("SYM{user}"), 10, TimeInForce::Day);
        tasks.push(tokio::spawn(
            async move { engine.place_order(request, user).await },
        ));
    }

    let mut order_ids = HashSet::new();
    for task in tasks {
        let response = task.await.unwrap().unwrap();
        assert_eq!(response.status, OrderStatus::Acknowledged);
        assert!(order_ids.insert(response.order_id));
    }

    assert_eq!(order_ids.len(), 100);
    assert_eq!(h.repository.len(), 100);
    assert_eq!(h.metrics.gauge("trading.orders.active", &[]), 100);

    // Placement counters across all brokers add up to every order placed
    let placed_total: u64 = h
        .registry
        .brokers()
        .iter()
        .map(|broker| {
            h.metrics
                .counter("trading.orders.placed", &[("broker", broker)])
        })
        .sum();
    assert_eq!(placed_total, 100);
}

#[tokio::test]
async fn hundred_concurrent_fills_merge_without_loss() {
    let h = harness();
    let placed = h
        .engine
        .place_order(limit_buy_with("RELIANCE", 100, TimeInForce::Day), 7)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..100u32 {
        let engine = h.engine.clone();
        let order_id = placed.order_id.clone();
        tasks.push(tokio::spawn(async move {
            engine
                .process_order_fill(
                    &order_id,
                    FillEvent {
                        execution_id: format!("EXE-{i}"),
                        quantity: Qty::from_units(1),
                        price: Px::from_rupees(2450),
                        // Unsequenced: every event must merge exactly once
                        sequence: None,
                    },
                )
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let final_state = h.engine.get_order(&placed.order_id, 7).await.unwrap();
    assert_eq!(final_state.filled_quantity, 100);
    assert_eq!(final_state.remaining_quantity, 0);
    assert_eq!(final_state.status, OrderStatus::Filled);
    assert_eq!(final_state.average_price, Px::from_rupees(2450));
}

#[tokio::test]
async fn conflicting_writers_surface_conflict_to_modify() {
    let h = harness();
    let placed = h
        .engine
        .place_order(limit_buy_with("RELIANCE", 100, TimeInForce::Day), 7)
        .await
        .unwrap();

    // A fill and a cancel race; whichever loses the version race either
    // retries (fill) or fails cleanly, and the store stays coherent.
    let fill_engine = h.engine.clone();
    let fill_id = placed.order_id.clone();
    let fill = tokio::spawn(async move {
        fill_engine
            .process_order_fill(
                &fill_id,
                FillEvent {
                    execution_id: "EXE-race".to_string(),
                    quantity: Qty::from_units(40),
                    price: Px::from_rupees(2450),
                    sequence: Some(1),
                },
            )
            .await
    });
    let cancel_engine = h.engine.clone();
    let cancel_id = placed.order_id.clone();
    let cancel = tokio::spawn(async move { cancel_engine.cancel_order(&cancel_id, 7).await });

    let _ = fill.await.unwrap();
    let _ = cancel.await.unwrap();

    let final_state = h.engine.get_order(&placed.order_id, 7).await.unwrap();
    assert!(matches!(
        final_state.status,
        OrderStatus::Cancelled | OrderStatus::PartiallyFilled | OrderStatus::CancelPending
    ));
}
