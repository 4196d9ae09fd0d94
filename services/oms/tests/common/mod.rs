//! Shared fixtures for the engine integration tests

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use broker_connector::{
    AlwaysLinkedAuth, BrokerGateway, BrokerRegistry, GatewayConfig, PaperBroker,
};
use chrono::{TimeZone, Utc};
use execution_router::{RouterConfig, SmartOrderRouter};
use oms::{
    EngineConfig, InMemoryOrderRepository, OpenRiskGate, OrderRequest, RiskGate, TradingEngine,
};
use rustc_hash::FxHashMap;
use services_common::{
    Exchange, LabelSchema, ManualClock, MetricsRegistry, OrderType, Px, Side, TimeInForce,
};
use std::sync::Arc;

/// Engine plus every collaborator a test may want to poke
pub struct TestHarness {
    pub engine: Arc<TradingEngine>,
    pub clock: ManualClock,
    pub registry: Arc<BrokerRegistry>,
    pub repository: Arc<InMemoryOrderRepository>,
    pub metrics: Arc<MetricsRegistry>,
    pub paper: FxHashMap<String, Arc<PaperBroker>>,
}

/// 10:00 IST on Monday 2025-06-02, well inside the trading session
pub fn mid_session() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 4, 30, 0).unwrap()
}

/// Build an engine over the in-memory store, instant paper brokers and a
/// manual clock frozen at mid-session
pub fn harness() -> TestHarness {
    harness_with_risk(Arc::new(OpenRiskGate))
}

/// Same stack with a caller-supplied risk gate
pub fn harness_with_risk(risk_gate: Arc<dyn RiskGate>) -> TestHarness {
    let clock = ManualClock::new(mid_session());
    let registry = Arc::new(BrokerRegistry::indian_default(Arc::new(clock.clone())));
    let gateway = Arc::new(BrokerGateway::new(
        Arc::clone(&registry),
        GatewayConfig::default(),
        Arc::new(clock.clone()),
    ));

    let mut paper = FxHashMap::default();
    for broker in registry.brokers() {
        let connector = Arc::new(PaperBroker::instant(&broker));
        gateway.attach(connector.clone());
        paper.insert(broker, connector);
    }

    let metrics = Arc::new(MetricsRegistry::new(LabelSchema::trading_default(
        registry.brokers(),
    )));
    let router = Arc::new(SmartOrderRouter::new(
        RouterConfig::default(),
        Arc::clone(&registry),
        Arc::clone(&gateway),
        Arc::new(AlwaysLinkedAuth),
        Arc::clone(&metrics),
    ));
    let repository = Arc::new(InMemoryOrderRepository::new());

    let engine = Arc::new(TradingEngine::new(
        EngineConfig::default(),
        repository.clone(),
        risk_gate,
        router,
        gateway,
        Arc::clone(&registry),
        Arc::clone(&metrics),
        Arc::new(clock.clone()),
    ));

    TestHarness {
        engine,
        clock,
        registry,
        repository,
        metrics,
        paper,
    }
}

/// A plain NSE limit buy: RELIANCE x100 @ 2450.75, DAY
pub fn limit_buy() -> OrderRequest {
    OrderRequest {
        symbol: "RELIANCE".to_string(),
        exchange: Exchange::Nse,
        side: Side::Buy,
        order_type: OrderType::Limit,
        quantity: 100,
        limit_price: Some(Px::from_paise(245_075)),
        stop_price: None,
        time_in_force: TimeInForce::Day,
        expiry_date: None,
    }
}

/// Same order with a caller-chosen symbol, quantity and time in force
pub fn limit_buy_with(symbol: &str, quantity: i64, tif: TimeInForce) -> OrderRequest {
    let mut request = limit_buy();
    request.symbol = symbol.to_string();
    request.quantity = quantity;
    request.time_in_force = tif;
    request
}
