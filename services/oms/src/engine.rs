//! The order lifecycle engine
//!
//! Orchestrates placement, modification, cancellation, fill application and
//! expiration over the order store, the risk gate, the router and the
//! broker gateway. Every public operation is timed against its SLA budget
//! and tagged with a correlation id.

use crate::lifecycle::OrderLifecycle;
use crate::order::{FillEvent, Order, OrderRequest, OrderResponse, OrderStatus};
use crate::repository::{OrderRepository, Page};
use crate::risk::RiskGate;
use crate::sla::{OrderProcessingContext, SlaMonitor};
use crate::validation::OrderValidator;
use crate::{EngineConfig, OrderEvent};
use broker_connector::{BrokerGateway, BrokerRegistry, CancelOutcome, ModifyTicket, OrderTicket};
use execution_router::{ExecutionStrategy, RouteRequest, SmartOrderRouter};
use services_common::{Clock, MetricsRegistry, MetricsSnapshot, OrderIds, TradeError, TradeResult};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the order event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The lifecycle engine: the only writer of order state
pub struct TradingEngine {
    config: EngineConfig,
    repository: Arc<dyn OrderRepository>,
    risk_gate: Arc<dyn RiskGate>,
    router: Arc<SmartOrderRouter>,
    gateway: Arc<BrokerGateway>,
    registry: Arc<BrokerRegistry>,
    validator: OrderValidator,
    lifecycle: OrderLifecycle,
    sla: SlaMonitor,
    metrics: Arc<MetricsRegistry>,
    clock: Arc<dyn Clock>,
    ids: OrderIds,
    events: broadcast::Sender<OrderEvent>,
}

impl TradingEngine {
    /// Wire the engine against its collaborators
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        repository: Arc<dyn OrderRepository>,
        risk_gate: Arc<dyn RiskGate>,
        router: Arc<SmartOrderRouter>,
        gateway: Arc<BrokerGateway>,
        registry: Arc<BrokerRegistry>,
        metrics: Arc<MetricsRegistry>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let validator = OrderValidator::new(config.max_notional_ticks);
        let sla = SlaMonitor::new(config.sla.clone(), Arc::clone(&metrics));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            repository,
            risk_gate,
            router,
            gateway,
            registry,
            validator,
            lifecycle: OrderLifecycle::new(),
            sla,
            metrics,
            clock,
            ids: OrderIds::new(),
            events,
        }
    }

    /// Subscribe to order events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<OrderEvent> {
        self.events.subscribe()
    }

    /// Point-in-time metrics view for dashboards
    #[must_use]
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Broker gateway, shared with the scheduler's health probe
    #[must_use]
    pub fn gateway(&self) -> Arc<BrokerGateway> {
        Arc::clone(&self.gateway)
    }

    /// Reload active orders after a restart: raises the internal id floor
    /// above everything ever stored and reports how many orders are live.
    pub async fn recover(&self) -> TradeResult<usize> {
        let max_id = self.repository.max_internal_id().await?;
        self.ids.ensure_at_least(max_id + 1);
        let active = self
            .repository
            .find_by_status_in(&OrderStatus::active_set())
            .await?;
        info!(count = active.len(), "recovered active orders");
        Ok(active.len())
    }

    // ---- placement ----

    /// Validate, risk-gate, persist, route and submit one order
    pub async fn place_order(
        &self,
        request: OrderRequest,
        user_id: i64,
    ) -> TradeResult<OrderResponse> {
        let ctx = self.open_context(Some(request.clone()), user_id);
        let result = self.place_inner(&ctx, &request).await;
        self.finish(&ctx, "place", result.as_ref().err());
        result
    }

    async fn place_inner(
        &self,
        ctx: &OrderProcessingContext,
        request: &OrderRequest,
    ) -> TradeResult<OrderResponse> {
        let now = self.clock.now();
        let validated = self.validator.validate(request, now)?;

        let approval = self.risk_gate.assess(&validated, ctx.user_id).await?;
        debug!(
            correlation_id = %ctx.correlation_id,
            risk_level = %approval.risk_level,
            "risk gate approved"
        );

        let mut order = Order::create(
            self.ids.next_internal(),
            self.ids.next_order_id(),
            ctx.user_id,
            &validated,
            now,
        );
        self.lifecycle
            .validate_transition(&order, OrderStatus::Pending)?;
        order.status = OrderStatus::Pending;
        let mut order = self.repository.save(&order).await?;
        let _ = self.metrics.gauge_add("trading.orders.active", &[], 1);
        let _ = self.events.send(OrderEvent::Created(order.clone()));
        info!(
            correlation_id = %ctx.correlation_id,
            order_id = %order.order_id,
            symbol = %order.symbol,
            side = %order.side,
            quantity = %order.quantity,
            "order accepted"
        );

        let route_request = RouteRequest {
            order_id: order.order_id.clone(),
            user_id: ctx.user_id,
            symbol: validated.symbol.clone(),
            exchange: validated.exchange,
            side: validated.side,
            order_type: validated.order_type,
            quantity: validated.quantity,
            effective_price: validated.effective_price,
        };
        let decision = match self.router.route(&route_request).await {
            Ok(decision) => decision,
            Err(error) => {
                let error = error.into_trade_error(&order.order_id);
                self.mark_rejected(&mut order, error.to_string()).await?;
                return Err(error);
            }
        };
        if decision.strategy == ExecutionStrategy::Reject {
            let error = TradeError::OrderRejected {
                order_id: order.order_id.clone(),
                reason: decision.reason.clone(),
            };
            self.mark_rejected(&mut order, decision.reason).await?;
            return Err(error);
        }
        let _ = self.metrics.increment(
            "trading.orders.placed",
            &[("broker", &decision.broker_name)],
        );

        let ticket = ticket_for(&order, &decision.venue, decision.strategy.as_str());
        match self.gateway.submit(&decision.broker_name, &ticket).await {
            Ok(ack) => {
                let old_status = order.status;
                self.lifecycle
                    .validate_transition(&order, OrderStatus::Acknowledged)?;
                order.status = OrderStatus::Acknowledged;
                order.broker_name = Some(decision.broker_name.clone());
                order.broker_order_id = Some(ack.broker_order_id);
                order.submitted_at = Some(self.clock.now());
                order.updated_at = self.clock.now();
                let expected = order.version;
                let order = self.repository.update_if_version(&order, expected).await?;
                self.emit_status_change(&order, old_status);
                info!(
                    correlation_id = %ctx.correlation_id,
                    order_id = %order.order_id,
                    broker = %decision.broker_name,
                    venue = %decision.venue,
                    strategy = %decision.strategy,
                    "order acknowledged"
                );
                Ok(OrderResponse::from(&order))
            }
            Err(error) => {
                self.mark_rejected(&mut order, error.to_string()).await?;
                Err(error)
            }
        }
    }

    // ---- modification ----

    /// Re-validate and apply new working fields; broker failure leaves the
    /// old fields intact
    pub async fn modify_order(
        &self,
        order_id: &str,
        request: OrderRequest,
        user_id: i64,
    ) -> TradeResult<OrderResponse> {
        let ctx = self.open_context(Some(request.clone()), user_id);
        let result = self.modify_inner(&ctx, order_id, &request).await;
        self.finish(&ctx, "modify", result.as_ref().err());
        result
    }

    async fn modify_inner(
        &self,
        ctx: &OrderProcessingContext,
        order_id: &str,
        request: &OrderRequest,
    ) -> TradeResult<OrderResponse> {
        let now = self.clock.now();
        let mut order = self.load_authorized(order_id, ctx.user_id).await?;
        let validated = self.validator.validate(request, now)?;

        if !self.lifecycle.can_modify(order.status) {
            return Err(TradeError::OrderRejected {
                order_id: order.order_id.clone(),
                reason: "non-modifiable state".to_string(),
            });
        }
        if validated.symbol != order.symbol
            || validated.exchange != order.exchange
            || validated.side != order.side
            || validated.order_type != order.order_type
        {
            return Err(TradeError::OrderRejected {
                order_id: order.order_id.clone(),
                reason: "only quantity, prices and time in force can be modified".to_string(),
            });
        }
        if validated.quantity < order.filled_quantity {
            return Err(TradeError::OrderRejected {
                order_id: order.order_id.clone(),
                reason: "cannot reduce quantity below the filled amount".to_string(),
            });
        }

        // Persist the pending modification first: the version bump proves
        // no concurrent writer slipped in between read and apply.
        order.updated_at = now;
        let expected = order.version;
        let mut order = self.repository.update_if_version(&order, expected).await?;

        // Orders already at a broker must be modified there before the new
        // fields become visible locally.
        if let (Some(broker), Some(broker_order_id)) =
            (order.broker_name.clone(), order.broker_order_id.clone())
        {
            let ticket = ticket_for(&order, order.exchange.as_str(), "IMMEDIATE");
            let changes = ModifyTicket {
                broker_order_id,
                new_quantity: Some(validated.quantity),
                new_limit_price: validated.limit_price,
                new_stop_price: validated.stop_price,
            };
            self.gateway.modify(&broker, &ticket, &changes).await?;
        }

        order.quantity = validated.quantity;
        order.limit_price = validated.limit_price;
        order.stop_price = validated.stop_price;
        order.time_in_force = validated.time_in_force;
        order.expiry_date = validated.expiry_date;
        order.updated_at = self.clock.now();
        let expected = order.version;
        let order = self.repository.update_if_version(&order, expected).await?;
        let _ = self.events.send(OrderEvent::Modified {
            order_id: order.order_id.clone(),
            timestamp: order.updated_at,
        });
        info!(
            correlation_id = %ctx.correlation_id,
            order_id = %order.order_id,
            version = order.version,
            "order modified"
        );
        Ok(OrderResponse::from(&order))
    }

    // ---- cancellation ----

    /// Cancel an order; when the broker's breaker is open the order stays
    /// CancelPending and the response is flagged degraded
    pub async fn cancel_order(&self, order_id: &str, user_id: i64) -> TradeResult<OrderResponse> {
        let ctx = self.open_context(None, user_id);
        let result = self.cancel_inner(&ctx, order_id).await;
        self.finish(&ctx, "cancel", result.as_ref().err());
        result
    }

    async fn cancel_inner(
        &self,
        ctx: &OrderProcessingContext,
        order_id: &str,
    ) -> TradeResult<OrderResponse> {
        let mut order = self.load_authorized(order_id, ctx.user_id).await?;
        if !self.lifecycle.can_cancel(order.status) {
            return Err(TradeError::OrderRejected {
                order_id: order.order_id.clone(),
                reason: "non-modifiable state".to_string(),
            });
        }

        // Orders that never reached a broker cancel locally
        if order.broker_order_id.is_none() {
            let order = self.finalize_cancel(order).await?;
            return Ok(OrderResponse::from(&order));
        }

        if order.status != OrderStatus::CancelPending {
            let old_status = order.status;
            self.lifecycle
                .validate_transition(&order, OrderStatus::CancelPending)?;
            order.status = OrderStatus::CancelPending;
            order.updated_at = self.clock.now();
            let expected = order.version;
            order = self.repository.update_if_version(&order, expected).await?;
            self.emit_status_change(&order, old_status);
        }

        let broker = order.broker_name.clone().ok_or_else(|| TradeError::Internal {
            detail: format!("order {} has a broker order id but no broker", order.order_id),
        })?;
        let broker_order_id = order
            .broker_order_id
            .clone()
            .unwrap_or_default();

        match self.gateway.cancel(&broker, &broker_order_id).await? {
            CancelOutcome { degraded: true, .. } => {
                info!(
                    correlation_id = %ctx.correlation_id,
                    order_id = %order.order_id,
                    broker = %broker,
                    "cancel accepted in degraded mode, reconciler will confirm"
                );
                let mut response = OrderResponse::from(&order);
                response.degraded = true;
                Ok(response)
            }
            CancelOutcome { .. } => {
                let order = self.finalize_cancel(order).await?;
                info!(
                    correlation_id = %ctx.correlation_id,
                    order_id = %order.order_id,
                    "order cancelled"
                );
                Ok(OrderResponse::from(&order))
            }
        }
    }

    async fn finalize_cancel(&self, mut order: Order) -> TradeResult<Order> {
        let old_status = order.status;
        self.lifecycle
            .validate_transition(&order, OrderStatus::Cancelled)?;
        order.status = OrderStatus::Cancelled;
        order.updated_at = self.clock.now();
        let expected = order.version;
        let order = self.repository.update_if_version(&order, expected).await?;
        let _ = self.metrics.gauge_add("trading.orders.active", &[], -1);
        self.emit_status_change(&order, old_status);
        let _ = self.events.send(OrderEvent::Cancelled {
            order_id: order.order_id.clone(),
            timestamp: order.updated_at,
        });
        Ok(order)
    }

    // ---- fills ----

    /// Apply one execution report. Stale sequences are dropped; version
    /// conflicts retry, so concurrent fills merge without loss.
    pub async fn process_order_fill(
        &self,
        order_id: &str,
        fill: FillEvent,
    ) -> TradeResult<OrderResponse> {
        loop {
            let Some(mut order) = self.repository.find_by_order_id(order_id).await? else {
                return Err(TradeError::NotFound {
                    order_id: order_id.to_string(),
                });
            };

            if let Some(sequence) = fill.sequence
                && sequence <= order.last_exec_sequence
            {
                debug!(
                    order_id,
                    sequence,
                    watermark = order.last_exec_sequence,
                    "dropping stale fill"
                );
                return Ok(OrderResponse::from(&order));
            }

            let old_status = order.status;
            order.apply_fill(fill.quantity, fill.price, self.clock.now())?;
            if let Some(sequence) = fill.sequence {
                order.last_exec_sequence = sequence;
            }

            let expected = order.version;
            match self.repository.update_if_version(&order, expected).await {
                Ok(order) => {
                    self.emit_status_change(&order, old_status);
                    let _ = self.events.send(OrderEvent::Filled {
                        order_id: order.order_id.clone(),
                        execution_id: fill.execution_id.clone(),
                        quantity: fill.quantity,
                        price: fill.price,
                        timestamp: order.updated_at,
                    });
                    if order.status == OrderStatus::Filled {
                        let broker = order.broker_name.clone().unwrap_or_else(|| "NONE".to_string());
                        let _ = self
                            .metrics
                            .increment("trading.orders.filled", &[("broker", &broker)]);
                        let _ = self.metrics.gauge_add("trading.orders.active", &[], -1);
                    }
                    return Ok(OrderResponse::from(&order));
                }
                Err(TradeError::Conflict { .. }) => {
                    // Another fill won the race; re-read and merge again
                    tokio::task::yield_now().await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    // ---- maintenance ----

    /// Expire lapsed DAY/GTD orders; returns how many were expired
    pub async fn expire_orders(&self) -> TradeResult<u64> {
        let now = self.clock.now();
        let candidates = self
            .repository
            .find_by_status_in(&OrderStatus::active_set())
            .await?;

        let mut expired = 0;
        for mut order in candidates {
            if !self.lifecycle.should_expire(&order, now) {
                continue;
            }
            let old_status = order.status;
            if self
                .lifecycle
                .validate_transition(&order, OrderStatus::Expired)
                .is_err()
            {
                continue;
            }
            order.status = OrderStatus::Expired;
            order.updated_at = now;
            let expected = order.version;
            match self.repository.update_if_version(&order, expected).await {
                Ok(order) => {
                    expired += 1;
                    let _ = self.metrics.gauge_add("trading.orders.active", &[], -1);
                    let _ = self.metrics.increment("trading.orders.expired", &[]);
                    self.emit_status_change(&order, old_status);
                    let _ = self.events.send(OrderEvent::Expired {
                        order_id: order.order_id.clone(),
                        timestamp: now,
                    });
                }
                Err(TradeError::Conflict { .. }) => {
                    // A concurrent writer moved the order on; next sweep decides
                }
                Err(error) => {
                    warn!(order_id = %order.order_id, %error, "failed to expire order");
                }
            }
        }
        if expired > 0 {
            info!(expired, "expiration sweep complete");
        }
        Ok(expired)
    }

    /// Retry broker cancels for CancelPending orders older than the
    /// configured age; returns how many reached Cancelled
    pub async fn reconcile_cancels(&self) -> TradeResult<u64> {
        let now = self.clock.now();
        let age = chrono::Duration::seconds(
            i64::try_from(self.config.cancel_reconcile_age_secs).unwrap_or(i64::MAX),
        );
        let pending = self
            .repository
            .find_by_status_in(&[OrderStatus::CancelPending])
            .await?;

        let mut reconciled = 0;
        for order in pending {
            if now.signed_duration_since(order.updated_at) < age {
                continue;
            }
            let (Some(broker), Some(broker_order_id)) =
                (order.broker_name.clone(), order.broker_order_id.clone())
            else {
                // Never reached a broker: confirm locally
                self.finalize_cancel(order).await?;
                reconciled += 1;
                continue;
            };

            match self.gateway.cancel(&broker, &broker_order_id).await {
                Ok(CancelOutcome { degraded: false, .. }) => {
                    self.finalize_cancel(order).await?;
                    reconciled += 1;
                }
                Ok(CancelOutcome { .. }) => {
                    // Breaker still open; try again next round
                }
                Err(error) => {
                    warn!(order_id = %order.order_id, broker = %broker, %error, "cancel reconciliation failed");
                }
            }
        }
        if reconciled > 0 {
            info!(reconciled, "cancel reconciliation complete");
        }
        Ok(reconciled)
    }

    // ---- queries ----

    /// Fetch one order owned by `user_id`
    pub async fn get_order(&self, order_id: &str, user_id: i64) -> TradeResult<OrderResponse> {
        let order = self.load_authorized(order_id, user_id).await?;
        Ok(OrderResponse::from(&order))
    }

    /// A user's orders, newest first
    pub async fn get_orders_by_user(
        &self,
        user_id: i64,
        page: Page,
    ) -> TradeResult<Vec<OrderResponse>> {
        let orders = self.repository.find_by_user(user_id, page).await?;
        Ok(orders.iter().map(OrderResponse::from).collect())
    }

    /// A user's orders currently in `status`
    pub async fn get_orders_by_user_and_status(
        &self,
        user_id: i64,
        status: OrderStatus,
    ) -> TradeResult<Vec<OrderResponse>> {
        let orders = self.repository.find_by_status_in(&[status]).await?;
        Ok(orders
            .iter()
            .filter(|order| order.user_id == user_id)
            .map(OrderResponse::from)
            .collect())
    }

    /// A user's non-terminal orders
    pub async fn get_active_orders(&self, user_id: i64) -> TradeResult<Vec<OrderResponse>> {
        let orders = self
            .repository
            .find_by_status_in(&OrderStatus::active_set())
            .await?;
        Ok(orders
            .iter()
            .filter(|order| order.user_id == user_id)
            .map(OrderResponse::from)
            .collect())
    }

    // ---- internals ----

    fn open_context(&self, request: Option<OrderRequest>, user_id: i64) -> OrderProcessingContext {
        OrderProcessingContext::new(
            self.ids.next_correlation_id(),
            user_id,
            request,
            self.clock.now(),
        )
    }

    fn finish(&self, ctx: &OrderProcessingContext, operation: &str, error: Option<&TradeError>) {
        if let Some(error) = error {
            let _ = self
                .metrics
                .increment("trading.orders.failed", &[("error_type", error.code())]);
            debug!(
                correlation_id = %ctx.correlation_id,
                operation,
                %error,
                "operation failed"
            );
        }
        self.sla.observe(operation, &ctx.correlation_id, ctx.elapsed());
    }

    async fn load_authorized(&self, order_id: &str, user_id: i64) -> TradeResult<Order> {
        let order = self
            .repository
            .find_by_order_id(order_id)
            .await?
            .ok_or_else(|| TradeError::NotFound {
                order_id: order_id.to_string(),
            })?;
        // Foreign orders look like missing orders; existence is not leaked
        if order.user_id != user_id {
            return Err(TradeError::NotFound {
                order_id: order_id.to_string(),
            });
        }
        Ok(order)
    }

    async fn mark_rejected(&self, order: &mut Order, reason: String) -> TradeResult<()> {
        let old_status = order.status;
        self.lifecycle
            .validate_transition(order, OrderStatus::Rejected)?;
        order.status = OrderStatus::Rejected;
        order.rejection_reason = Some(reason);
        order.updated_at = self.clock.now();
        let expected = order.version;
        let updated = self.repository.update_if_version(order, expected).await?;
        *order = updated;
        let _ = self.metrics.gauge_add("trading.orders.active", &[], -1);
        self.emit_status_change(order, old_status);
        Ok(())
    }

    fn emit_status_change(&self, order: &Order, old_status: OrderStatus) {
        if order.status != old_status {
            let _ = self.events.send(OrderEvent::StatusChanged {
                order_id: order.order_id.clone(),
                old_status,
                new_status: order.status,
                timestamp: order.updated_at,
            });
        }
    }

    /// Registry handle, shared with the scheduler
    #[must_use]
    pub fn registry(&self) -> Arc<BrokerRegistry> {
        Arc::clone(&self.registry)
    }
}

fn ticket_for(order: &Order, venue: &str, strategy: &str) -> OrderTicket {
    OrderTicket {
        order_id: order.order_id.clone(),
        user_id: order.user_id,
        symbol: order.symbol.clone(),
        exchange: order.exchange,
        side: order.side,
        order_type: order.order_type,
        quantity: order.quantity,
        limit_price: order.limit_price,
        stop_price: order.stop_price,
        time_in_force: order.time_in_force,
        venue: venue.to_string(),
        strategy: strategy.to_string(),
    }
}
