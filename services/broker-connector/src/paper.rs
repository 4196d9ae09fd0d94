//! Paper broker connector
//!
//! Deterministic simulation used by integration tests and database-less
//! runs: acknowledges every call after a configurable latency, with a FIFO
//! queue of injectable failures for exercising breaker and degradation
//! paths.

use crate::client::{BrokerAck, BrokerApi, ModifyTicket, OrderTicket};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use services_common::BrokerError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Simulated broker connector
pub struct PaperBroker {
    name: String,
    latency: Duration,
    sequence: AtomicU64,
    call_count: AtomicU64,
    planned_failures: Mutex<VecDeque<BrokerError>>,
}

impl PaperBroker {
    /// Connector acknowledging after `latency`
    #[must_use]
    pub fn new(name: &str, latency: Duration) -> Self {
        Self {
            name: name.to_string(),
            latency,
            sequence: AtomicU64::new(1),
            call_count: AtomicU64::new(0),
            planned_failures: Mutex::new(VecDeque::new()),
        }
    }

    /// Connector with zero latency, for tests
    #[must_use]
    pub fn instant(name: &str) -> Self {
        Self::new(name, Duration::ZERO)
    }

    /// Queue `count` copies of `error`; subsequent calls fail in FIFO order
    pub fn fail_next(&self, count: usize, error: BrokerError) {
        let mut planned = self.planned_failures.lock();
        for _ in 0..count {
            planned.push_back(error.clone());
        }
    }

    /// Total calls that reached this connector
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    async fn respond(&self, context: &str) -> Result<BrokerAck, BrokerError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(error) = self.planned_failures.lock().pop_front() {
            debug!(broker = %self.name, context, %error, "paper broker injecting failure");
            return Err(error);
        }
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        Ok(BrokerAck {
            broker_order_id: format!("{}-{seq}", self.name),
            broker: self.name.clone(),
            accepted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl BrokerApi for PaperBroker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, ticket: &OrderTicket) -> Result<BrokerAck, BrokerError> {
        debug!(
            broker = %self.name,
            order_id = %ticket.order_id,
            symbol = %ticket.symbol,
            side = %ticket.side,
            qty = %ticket.quantity,
            venue = %ticket.venue,
            "paper submit"
        );
        self.respond("submit").await
    }

    async fn modify(
        &self,
        ticket: &OrderTicket,
        changes: &ModifyTicket,
    ) -> Result<BrokerAck, BrokerError> {
        debug!(
            broker = %self.name,
            order_id = %ticket.order_id,
            broker_order_id = %changes.broker_order_id,
            "paper modify"
        );
        let mut ack = self.respond("modify").await?;
        // Modifies keep the original broker-side id
        ack.broker_order_id = changes.broker_order_id.clone();
        Ok(ack)
    }

    async fn cancel(&self, broker_order_id: &str) -> Result<BrokerAck, BrokerError> {
        debug!(broker = %self.name, broker_order_id, "paper cancel");
        let mut ack = self.respond("cancel").await?;
        ack.broker_order_id = broker_order_id.to_string();
        Ok(ack)
    }

    async fn heartbeat(&self) -> Result<(), BrokerError> {
        if let Some(error) = self.planned_failures.lock().pop_front() {
            return Err(error);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use services_common::{Exchange, OrderType, Px, Qty, Side, Symbol, TimeInForce};

    fn ticket() -> OrderTicket {
        OrderTicket {
            order_id: "ORD-paper".to_string(),
            user_id: 1,
            symbol: Symbol::parse("INFY").unwrap(),
            exchange: Exchange::Nse,
            side: Side::Sell,
            order_type: OrderType::Market,
            quantity: Qty::from_units(10),
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Ioc,
            venue: "NSE".to_string(),
            strategy: "IMMEDIATE".to_string(),
        }
    }

    #[tokio::test]
    async fn acks_carry_sequential_ids() {
        let broker = PaperBroker::instant("ZERODHA");
        let a = broker.submit(&ticket()).await.unwrap();
        let b = broker.submit(&ticket()).await.unwrap();
        assert_eq!(a.broker_order_id, "ZERODHA-1");
        assert_eq!(b.broker_order_id, "ZERODHA-2");
        assert_eq!(broker.calls(), 2);
    }

    #[tokio::test]
    async fn injected_failures_drain_in_order() {
        let broker = PaperBroker::instant("UPSTOX");
        broker.fail_next(1, BrokerError::Timeout { timeout_ms: 100 });
        broker.fail_next(
            1,
            BrokerError::Rejected {
                reason: "rms".into(),
            },
        );

        assert!(matches!(
            broker.submit(&ticket()).await.unwrap_err(),
            BrokerError::Timeout { .. }
        ));
        assert!(matches!(
            broker.submit(&ticket()).await.unwrap_err(),
            BrokerError::Rejected { .. }
        ));
        assert!(broker.submit(&ticket()).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_echoes_broker_order_id() {
        let broker = PaperBroker::instant("ANGEL_ONE");
        let ack = broker.cancel("ANGEL_ONE-42").await.unwrap();
        assert_eq!(ack.broker_order_id, "ANGEL_ONE-42");
    }
}
