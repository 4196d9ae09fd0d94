//! Outbound broker gateway
//!
//! Wraps raw per-broker connectors (`BrokerApi`) with deadlines, circuit
//! breakers and registry health accounting. The cancel path degrades
//! gracefully: an open breaker yields a degraded success so the lifecycle
//! engine can hold the order in CancelPending for the reconciler.

use crate::circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::registry::BrokerRegistry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use services_common::constants::resilience;
use services_common::{
    BrokerError, Clock, Exchange, OrderType, Px, Qty, Side, Symbol, TimeInForce, TradeError,
    TradeResult,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Snapshot of an order handed to a broker connector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTicket {
    /// External order id
    pub order_id: String,
    /// Owning user
    pub user_id: i64,
    /// Instrument
    pub symbol: Symbol,
    /// Exchange to execute on
    pub exchange: Exchange,
    /// Buy or sell
    pub side: Side,
    /// Order type
    pub order_type: OrderType,
    /// Quantity
    pub quantity: Qty,
    /// Limit price, when the type requires one
    pub limit_price: Option<Px>,
    /// Stop price, when the type requires one
    pub stop_price: Option<Px>,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Venue chosen by routing
    pub venue: String,
    /// Execution strategy chosen by routing
    pub strategy: String,
}

/// Requested changes for a working order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifyTicket {
    /// Broker-side order id
    pub broker_order_id: String,
    /// New quantity, if changing
    pub new_quantity: Option<Qty>,
    /// New limit price, if changing
    pub new_limit_price: Option<Px>,
    /// New stop price, if changing
    pub new_stop_price: Option<Px>,
}

/// Broker acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAck {
    /// Broker-side order id
    pub broker_order_id: String,
    /// Acknowledging broker
    pub broker: String,
    /// Acknowledgment instant
    pub accepted_at: DateTime<Utc>,
}

/// Outcome of a cancel request; `degraded` means the broker was not
/// contacted because its breaker is open
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    /// Acknowledgment when the broker confirmed the cancel
    pub ack: Option<BrokerAck>,
    /// True when the cancel was accepted locally only
    pub degraded: bool,
}

/// Raw connector for one broker
#[async_trait]
pub trait BrokerApi: Send + Sync {
    /// Broker name this connector serves
    fn name(&self) -> &str;

    /// Submit a new order
    async fn submit(&self, ticket: &OrderTicket) -> Result<BrokerAck, BrokerError>;

    /// Modify a working order
    async fn modify(&self, ticket: &OrderTicket, changes: &ModifyTicket)
    -> Result<BrokerAck, BrokerError>;

    /// Cancel a working order
    async fn cancel(&self, broker_order_id: &str) -> Result<BrokerAck, BrokerError>;

    /// Cheap liveness check used by the health probe
    async fn heartbeat(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Gateway timeouts and breaker tuning
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Submit deadline, milliseconds
    pub submit_timeout_ms: u64,
    /// Modify deadline, milliseconds
    pub modify_timeout_ms: u64,
    /// Cancel deadline, milliseconds
    pub cancel_timeout_ms: u64,
    /// Per-broker breaker tuning
    pub breaker: CircuitBreakerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            submit_timeout_ms: resilience::DEFAULT_SUBMIT_TIMEOUT_MS,
            modify_timeout_ms: resilience::DEFAULT_MODIFY_TIMEOUT_MS,
            cancel_timeout_ms: resilience::DEFAULT_CANCEL_TIMEOUT_MS,
            breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Fault-isolated outbound call path shared by engine and scheduler
pub struct BrokerGateway {
    connectors: DashMap<String, Arc<dyn BrokerApi>>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    registry: Arc<BrokerRegistry>,
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
}

impl BrokerGateway {
    /// Create a gateway over `registry` with no connectors attached yet
    #[must_use]
    pub fn new(registry: Arc<BrokerRegistry>, config: GatewayConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            connectors: DashMap::new(),
            breakers: DashMap::new(),
            registry,
            config,
            clock,
        }
    }

    /// Attach a connector; replaces any previous connector for the broker
    pub fn attach(&self, connector: Arc<dyn BrokerApi>) {
        let name = connector.name().to_string();
        debug!(broker = %name, "broker connector attached");
        self.connectors.insert(name, connector);
    }

    /// Breaker state for a broker, `Closed` when the broker is unknown
    #[must_use]
    pub fn breaker_state(&self, broker: &str) -> CircuitState {
        self.breakers
            .get(broker)
            .map_or(CircuitState::Closed, |b| b.state())
    }

    fn breaker(&self, broker: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(broker.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    broker,
                    self.config.breaker.clone(),
                    Arc::clone(&self.clock),
                ))
            })
            .clone()
    }

    fn connector(&self, broker: &str) -> TradeResult<Arc<dyn BrokerApi>> {
        self.connectors
            .get(broker)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| TradeError::Internal {
                detail: format!("no connector attached for broker {broker}"),
            })
    }

    /// Run one guarded call: breaker admission, deadline, breaker and
    /// registry accounting. Malformed/Unknown responses prove the broker is
    /// reachable, so only Timeout and Rejected count against the breaker.
    async fn guarded<F, Fut>(
        &self,
        broker: &str,
        timeout_ms: u64,
        call: F,
    ) -> TradeResult<BrokerAck>
    where
        F: FnOnce(Arc<dyn BrokerApi>) -> Fut,
        Fut: Future<Output = Result<BrokerAck, BrokerError>> + Send,
    {
        let connector = self.connector(broker)?;
        let breaker = self.breaker(broker);
        if !breaker.allow_call() {
            return Err(TradeError::ServiceUnavailable {
                broker: broker.to_string(),
            });
        }

        let outcome = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            call(connector),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout { timeout_ms }),
        };

        match outcome {
            Ok(ack) => {
                breaker.record_success();
                self.registry.record_success(broker);
                Ok(ack)
            }
            Err(error) => {
                if error.counts_against_breaker() {
                    breaker.record_failure();
                    self.registry.record_failure(broker);
                } else {
                    breaker.record_success();
                }
                Err(TradeError::Broker(error))
            }
        }
    }

    /// Submit a new order through the broker's breaker
    pub async fn submit(&self, broker: &str, ticket: &OrderTicket) -> TradeResult<BrokerAck> {
        let ticket = ticket.clone();
        self.guarded(broker, self.config.submit_timeout_ms, move |api| async move {
            api.submit(&ticket).await
        })
        .await
    }

    /// Modify a working order through the broker's breaker
    pub async fn modify(
        &self,
        broker: &str,
        ticket: &OrderTicket,
        changes: &ModifyTicket,
    ) -> TradeResult<BrokerAck> {
        let ticket = ticket.clone();
        let changes = changes.clone();
        self.guarded(broker, self.config.modify_timeout_ms, move |api| async move {
            api.modify(&ticket, &changes).await
        })
        .await
    }

    /// Cancel a working order. When the breaker is open the broker is not
    /// contacted and a degraded outcome is returned instead of an error.
    pub async fn cancel(&self, broker: &str, broker_order_id: &str) -> TradeResult<CancelOutcome> {
        if self.breaker(broker).state() == CircuitState::Open {
            warn!(
                broker,
                broker_order_id, "circuit open, accepting cancel in degraded mode"
            );
            return Ok(CancelOutcome {
                ack: None,
                degraded: true,
            });
        }

        let broker_order_id = broker_order_id.to_string();
        let ack = self
            .guarded(broker, self.config.cancel_timeout_ms, move |api| async move {
                api.cancel(&broker_order_id).await
            })
            .await?;
        Ok(CancelOutcome {
            ack: Some(ack),
            degraded: false,
        })
    }

    /// Probe every attached connector and fold the results into the
    /// registry. Returns the number of healthy brokers.
    pub async fn probe_health(&self) -> usize {
        let connectors: Vec<Arc<dyn BrokerApi>> = self
            .connectors
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();

        let mut healthy = 0;
        for connector in connectors {
            let broker = connector.name().to_string();
            match connector.heartbeat().await {
                Ok(()) => {
                    self.registry.record_success(&broker);
                    healthy += 1;
                }
                Err(error) => {
                    warn!(broker = %broker, %error, "health probe failed");
                    self.registry.record_failure(&broker);
                }
            }
        }
        info!(healthy, "broker health probe complete");
        healthy
    }
}
