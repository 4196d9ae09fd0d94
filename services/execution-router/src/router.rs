//! Smart order router pipeline
//!
//! size gate -> exchange candidates -> multiplicative scoring -> strategy
//! -> venue -> connectivity probe (with fallback) -> fee estimate ->
//! metrics. The pipeline reads a consistent registry snapshot and is
//! deterministic for a given snapshot and order.

use crate::error::RoutingError;
use crate::{ExecutionStrategy, OrderSizeClass, RouteRequest, RouterConfig, RoutingDecision};
use broker_connector::{BrokerAuthService, BrokerGateway, BrokerRegistry, CircuitState};
use services_common::constants::routing::FALLBACK_CONFIDENCE;
use services_common::{Exchange, MetricsRegistry, OrderType};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Multi-factor broker selection over the live registry
pub struct SmartOrderRouter {
    config: RouterConfig,
    registry: Arc<BrokerRegistry>,
    gateway: Arc<BrokerGateway>,
    auth: Arc<dyn BrokerAuthService>,
    metrics: Arc<MetricsRegistry>,
}

impl SmartOrderRouter {
    /// Wire the router against registry, gateway and auth lookups
    #[must_use]
    pub fn new(
        config: RouterConfig,
        registry: Arc<BrokerRegistry>,
        gateway: Arc<BrokerGateway>,
        auth: Arc<dyn BrokerAuthService>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            registry,
            gateway,
            auth,
            metrics,
        }
    }

    /// Produce a routing decision for one order
    pub async fn route(&self, request: &RouteRequest) -> Result<RoutingDecision, RoutingError> {
        let started = Instant::now();

        // 1. Size gate
        let quantity_units = request.quantity.units();
        if quantity_units > self.config.max_single_order_units {
            return Err(RoutingError::OrderTooLarge {
                quantity_units,
                max_units: self.config.max_single_order_units,
            });
        }

        // 2. Candidate set for the exchange
        let candidates = self.registry.brokers_for_exchange(request.exchange);
        if candidates.is_empty() {
            return Err(RoutingError::NoBrokerAvailable {
                exchange: request.exchange.as_str().to_string(),
            });
        }

        // 3. Multiplicative scoring, arg-max with ties broken by candidate order
        let size_class = OrderSizeClass::classify(quantity_units, self.config.large_order_units);
        let mut best = &candidates[0];
        let mut best_score = self.score(best, request, size_class);
        for candidate in &candidates[1..] {
            let score = self.score(candidate, request, size_class);
            if score > best_score {
                best = candidate;
                best_score = score;
            }
        }

        // 4 and 5. Strategy, then venue
        let strategy = select_strategy(request.order_type, size_class);
        let venue = select_venue(strategy, request.exchange);

        // 6. Connectivity probe, fallback on an unusable choice
        let (broker_name, confidence, reason) = if self.usable(request.user_id, best).await {
            (
                best.clone(),
                best_score.min(1.0),
                format!(
                    "scored {best_score:.3} for {} {} x{quantity_units} on {}",
                    request.order_type, request.symbol, request.exchange
                ),
            )
        } else {
            let fallback = &self.config.fallback_broker;
            warn!(
                order_id = %request.order_id,
                broker = %best,
                fallback = %fallback,
                "chosen broker unusable, probing fallback"
            );
            if !self.usable(request.user_id, fallback).await {
                return Err(RoutingError::BrokerConnectivity {
                    broker: best.clone(),
                    fallback: fallback.clone(),
                });
            }
            (
                fallback.clone(),
                FALLBACK_CONFIDENCE,
                format!("fallback from {best}: broker unusable at decision time"),
            )
        };

        // 7. Informational fee estimate
        let estimated_fees = self.estimate_fees(&broker_name, request);

        let processing_time = started.elapsed();
        let decision = RoutingDecision {
            broker_name,
            venue,
            strategy,
            immediate_execution: strategy == ExecutionStrategy::Immediate,
            estimated_execution_time: strategy.estimated_execution_time(),
            confidence,
            reason,
            estimated_fees,
            router_name: self.config.router_name.clone(),
            processing_time_ms: u64::try_from(processing_time.as_millis()).unwrap_or(u64::MAX),
        };

        // 8. Routing metrics
        let _ = self.metrics.record_timer(
            "trading.routing",
            &[("router", &self.config.router_name)],
            processing_time,
        );
        let immediate = if decision.immediate_execution { "true" } else { "false" };
        let _ = self.metrics.increment(
            "trading.routing.decisions",
            &[
                ("router", &self.config.router_name),
                ("broker", &decision.broker_name),
                ("strategy", decision.strategy.as_str()),
                ("immediate", immediate),
            ],
        );

        debug!(
            order_id = %request.order_id,
            broker = %decision.broker_name,
            strategy = %decision.strategy,
            venue = %decision.venue,
            confidence = decision.confidence,
            "routing decision"
        );
        Ok(decision)
    }

    fn score(&self, broker: &str, request: &RouteRequest, size_class: OrderSizeClass) -> f64 {
        let base = if broker == self.config.primary_broker {
            1.0
        } else {
            0.8
        };
        base * size_class.score_factor()
            * type_factor(request.order_type)
            * exchange_factor(request.exchange)
    }

    /// A broker is usable when the registry says so, its breaker is not
    /// open, and the user holds a live session with it.
    async fn usable(&self, user_id: i64, broker: &str) -> bool {
        if !self.registry.is_usable(broker) {
            return false;
        }
        if self.gateway.breaker_state(broker) == CircuitState::Open {
            return false;
        }
        match self.auth.broker_connection(user_id, broker).await {
            Ok(connection) => connection.usable,
            Err(error) => {
                warn!(broker, %error, "connectivity probe failed");
                false
            }
        }
    }

    fn estimate_fees(&self, broker: &str, request: &RouteRequest) -> i64 {
        request.effective_price.map_or(0, |price| {
            let notional = price.notional(request.quantity);
            let centibps = self.registry.fee_centibps(broker);
            // centibps are hundredths of a basis point: 1e6 centibps = 100%
            let fee = i128::from(notional) * i128::from(centibps) / 1_000_000;
            i64::try_from(fee).unwrap_or(i64::MAX)
        })
    }
}

const fn type_factor(order_type: OrderType) -> f64 {
    match order_type {
        OrderType::Market => 1.0,
        OrderType::Limit => 0.95,
        OrderType::StopLoss | OrderType::StopLimit => 0.9,
    }
}

const fn exchange_factor(exchange: Exchange) -> f64 {
    match exchange {
        Exchange::Nse => 1.0,
        Exchange::Bse => 0.95,
        Exchange::Mcx => 0.9,
    }
}

const fn select_strategy(order_type: OrderType, size_class: OrderSizeClass) -> ExecutionStrategy {
    match order_type {
        OrderType::Market => ExecutionStrategy::Immediate,
        OrderType::Limit => match size_class {
            OrderSizeClass::Small | OrderSizeClass::Medium => ExecutionStrategy::Immediate,
            OrderSizeClass::Large => ExecutionStrategy::Sliced,
        },
        OrderType::StopLoss | OrderType::StopLimit => ExecutionStrategy::Scheduled,
    }
}

fn select_venue(strategy: ExecutionStrategy, exchange: Exchange) -> String {
    match strategy {
        ExecutionStrategy::DarkPool => "DARK_POOL".to_string(),
        ExecutionStrategy::Vwap
        | ExecutionStrategy::Twap
        | ExecutionStrategy::Iceberg
        | ExecutionStrategy::Sliced => "ALGORITHMIC".to_string(),
        ExecutionStrategy::Smart => format!("{}_SMART", exchange.as_str()),
        _ => exchange.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use broker_connector::{
        ANGEL_ONE, AlwaysLinkedAuth, BrokerConnection, GatewayConfig, UPSTOX, ZERODHA,
    };
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use services_common::constants::fixed_point::SCALE_4;
    use services_common::{
        LabelSchema, ManualClock, Px, Qty, Side, Symbol, TradeResult,
    };

    struct DenyBroker(&'static str);

    #[async_trait]
    impl BrokerAuthService for DenyBroker {
        async fn broker_connection(
            &self,
            _user_id: i64,
            broker: &str,
        ) -> TradeResult<BrokerConnection> {
            Ok(BrokerConnection {
                broker: broker.to_string(),
                usable: broker != self.0,
            })
        }
    }

    fn fixture(auth: Arc<dyn BrokerAuthService>) -> (SmartOrderRouter, Arc<BrokerRegistry>) {
        let clock = ManualClock::new(chrono::Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap());
        let registry = Arc::new(BrokerRegistry::indian_default(Arc::new(clock.clone())));
        let gateway = Arc::new(BrokerGateway::new(
            Arc::clone(&registry),
            GatewayConfig::default(),
            Arc::new(clock),
        ));
        let metrics = Arc::new(MetricsRegistry::new(LabelSchema::trading_default([
            ZERODHA, UPSTOX, ANGEL_ONE,
        ])));
        let router = SmartOrderRouter::new(
            RouterConfig::default(),
            Arc::clone(&registry),
            gateway,
            auth,
            metrics,
        );
        (router, registry)
    }

    fn request(exchange: Exchange, order_type: OrderType, units: i64) -> RouteRequest {
        RouteRequest {
            order_id: "ORD-route".to_string(),
            user_id: 7,
            symbol: Symbol::parse("RELIANCE").unwrap(),
            exchange,
            side: Side::Buy,
            order_type,
            quantity: Qty::from_units(units),
            effective_price: Some(Px::from_paise(245_075)),
        }
    }

    #[tokio::test]
    async fn small_limit_order_routes_immediate_to_primary() {
        let (router, _) = fixture(Arc::new(AlwaysLinkedAuth));
        let decision = router
            .route(&request(Exchange::Nse, OrderType::Limit, 100))
            .await
            .unwrap();

        assert_eq!(decision.broker_name, ZERODHA);
        assert_eq!(decision.strategy, ExecutionStrategy::Immediate);
        assert_eq!(decision.venue, "NSE");
        assert!(decision.immediate_execution);
        assert!(decision.confidence > 0.9);
        assert_eq!(decision.router_name, "smart_router");
    }

    #[tokio::test]
    async fn large_limit_order_is_sliced_to_algorithmic_venue() {
        let (router, _) = fixture(Arc::new(AlwaysLinkedAuth));
        let decision = router
            .route(&request(Exchange::Nse, OrderType::Limit, 15_000))
            .await
            .unwrap();

        assert_eq!(decision.strategy, ExecutionStrategy::Sliced);
        assert_eq!(decision.venue, "ALGORITHMIC");
        assert!(!decision.immediate_execution);
    }

    #[tokio::test]
    async fn stop_orders_are_scheduled_on_the_exchange_venue() {
        let (router, _) = fixture(Arc::new(AlwaysLinkedAuth));
        let decision = router
            .route(&request(Exchange::Bse, OrderType::StopLimit, 500))
            .await
            .unwrap();
        assert_eq!(decision.strategy, ExecutionStrategy::Scheduled);
        assert_eq!(decision.venue, "BSE");
    }

    #[tokio::test]
    async fn oversized_orders_are_refused() {
        let (router, _) = fixture(Arc::new(AlwaysLinkedAuth));
        let err = router
            .route(&request(Exchange::Nse, OrderType::Limit, 100_001))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RoutingError::OrderTooLarge {
                quantity_units: 100_001,
                max_units: 100_000,
            }
        );
    }

    #[tokio::test]
    async fn mcx_never_selects_upstox() {
        let (router, _) = fixture(Arc::new(AlwaysLinkedAuth));
        for units in [10, 1_000, 50_000] {
            let decision = router
                .route(&request(Exchange::Mcx, OrderType::Market, units))
                .await
                .unwrap();
            assert_ne!(decision.broker_name, UPSTOX);
        }
    }

    #[tokio::test]
    async fn routing_is_deterministic_for_a_snapshot() {
        let (router, _) = fixture(Arc::new(AlwaysLinkedAuth));
        let req = request(Exchange::Nse, OrderType::Limit, 2_500);
        let first = router.route(&req).await.unwrap();
        for _ in 0..10 {
            let next = router.route(&req).await.unwrap();
            assert_eq!(next.broker_name, first.broker_name);
            assert_eq!(next.strategy, first.strategy);
            assert_eq!(next.venue, first.venue);
        }
    }

    #[tokio::test]
    async fn unusable_primary_falls_back_with_reduced_confidence() {
        let (router, registry) = fixture(Arc::new(AlwaysLinkedAuth));
        registry.set_state(ZERODHA, broker_connector::ConnectionState::Maintenance);

        let decision = router
            .route(&request(Exchange::Nse, OrderType::Limit, 100))
            .await
            .unwrap();
        assert_eq!(decision.broker_name, UPSTOX);
        assert!((decision.confidence - FALLBACK_CONFIDENCE).abs() < f64::EPSILON);
        assert!(decision.reason.contains("fallback"));
        // Strategy and venue survive the fallback
        assert_eq!(decision.strategy, ExecutionStrategy::Immediate);
        assert_eq!(decision.venue, "NSE");
    }

    #[tokio::test]
    async fn unusable_fallback_is_a_connectivity_error() {
        let (router, registry) = fixture(Arc::new(DenyBroker(UPSTOX)));
        registry.set_state(ZERODHA, broker_connector::ConnectionState::Maintenance);

        let err = router
            .route(&request(Exchange::Nse, OrderType::Limit, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::BrokerConnectivity { .. }));
    }

    #[tokio::test]
    async fn auth_denial_forces_fallback() {
        let (router, _) = fixture(Arc::new(DenyBroker(ZERODHA)));
        let decision = router
            .route(&request(Exchange::Nse, OrderType::Limit, 100))
            .await
            .unwrap();
        assert_eq!(decision.broker_name, UPSTOX);
    }

    #[tokio::test]
    async fn fee_estimate_uses_the_broker_schedule() {
        let (router, _) = fixture(Arc::new(AlwaysLinkedAuth));
        let mut req = request(Exchange::Nse, OrderType::Limit, 100);
        req.effective_price = Some(Px::from_rupees(1_000));

        let decision = router.route(&req).await.unwrap();
        // 100 shares @ 1000.00 = 100,000.00 notional; 3 bps = 30.00
        assert_eq!(decision.broker_name, ZERODHA);
        assert_eq!(decision.estimated_fees, 30 * SCALE_4);

        // Market orders carry no effective price and no estimate
        req.order_type = OrderType::Market;
        req.effective_price = None;
        let decision = router.route(&req).await.unwrap();
        assert_eq!(decision.estimated_fees, 0);
    }
}
