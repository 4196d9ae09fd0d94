//! Order lifecycle engine
//!
//! The core of the trading service: accepts validated order requests,
//! gates them through pre-trade risk, routes them to a broker, tracks
//! state transitions through fills, cancels and expiry, and enforces
//! latency and resilience invariants along the way.
//!
//! Structure:
//! - [`order`]: entity, request/response shapes, fill accounting
//! - [`validation`]: the entry gate
//! - [`lifecycle`]: state machine and TIF expiry rules
//! - [`repository`] / [`persistence`]: version-guarded order store
//! - [`risk`]: consumed pre-trade gate contract
//! - [`engine`]: the orchestrating lifecycle engine
//! - [`sla`]: latency budgets and per-request context
//! - [`scheduler`]: expiry sweeps, health probes, cancel reconciliation

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod engine;
pub mod lifecycle;
pub mod order;
pub mod persistence;
pub mod repository;
pub mod risk;
pub mod scheduler;
pub mod sla;
pub mod validation;

pub use engine::TradingEngine;
pub use order::{FillEvent, Order, OrderRequest, OrderResponse, OrderStatus, ValidatedRequest};
pub use repository::{InMemoryOrderRepository, OrderRepository, Page};
pub use risk::{OpenRiskGate, RiskApproval, RiskGate, RiskLevel};
pub use sla::SlaConfig;

use chrono::{DateTime, Utc};
use services_common::constants::scheduler::CANCEL_RECONCILE_AGE_SECS;
use services_common::constants::trading::MAX_ORDER_NOTIONAL_TICKS;
use services_common::{Px, Qty};

/// Engine tuning, injected at construction
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cap on effective order value, in currency ticks
    pub max_notional_ticks: i64,
    /// Per-operation latency budgets
    pub sla: SlaConfig,
    /// Age before the reconciler retries a CancelPending order, seconds
    pub cancel_reconcile_age_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_notional_ticks: MAX_ORDER_NOTIONAL_TICKS,
            sla: SlaConfig::default(),
            cancel_reconcile_age_secs: CANCEL_RECONCILE_AGE_SECS,
        }
    }
}

/// Order events broadcast to in-process subscribers
#[derive(Debug, Clone)]
pub enum OrderEvent {
    /// A new order was accepted and persisted
    Created(Order),
    /// Lifecycle state changed
    StatusChanged {
        /// External order id
        order_id: String,
        /// Previous state
        old_status: OrderStatus,
        /// New state
        new_status: OrderStatus,
        /// When the change was applied
        timestamp: DateTime<Utc>,
    },
    /// An execution was applied
    Filled {
        /// External order id
        order_id: String,
        /// Execution id from the broker
        execution_id: String,
        /// Executed quantity
        quantity: Qty,
        /// Execution price
        price: Px,
        /// When the fill was applied
        timestamp: DateTime<Utc>,
    },
    /// Working fields were modified
    Modified {
        /// External order id
        order_id: String,
        /// When the modification was applied
        timestamp: DateTime<Utc>,
    },
    /// Cancel confirmed
    Cancelled {
        /// External order id
        order_id: String,
        /// When the cancel was confirmed
        timestamp: DateTime<Utc>,
    },
    /// Lapsed by time in force
    Expired {
        /// External order id
        order_id: String,
        /// When the sweep expired it
        timestamp: DateTime<Utc>,
    },
}
