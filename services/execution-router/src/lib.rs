//! Execution Router
//!
//! Scores the brokers able to serve an order's exchange, picks an execution
//! strategy and venue, validates connectivity against the live registry and
//! breaker state, and falls back to the configured secondary broker when
//! the chosen one is unusable. Routing is a pure function of the order and
//! a registry snapshot; it never mutates order state.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod router;

pub use error::RoutingError;
pub use router::SmartOrderRouter;

use serde::{Deserialize, Serialize};
use services_common::constants::routing;
use services_common::{Exchange, OrderType, Px, Qty, Side, Symbol};
use std::fmt;
use std::time::Duration;

/// Execution strategies a decision can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStrategy {
    /// Single shot, now
    Immediate,
    /// Split into child slices
    Sliced,
    /// Display only part of the size
    Iceberg,
    /// Held until a trigger condition
    Scheduled,
    /// Venue-seeking smart execution
    Smart,
    /// Volume-weighted schedule
    Vwap,
    /// Time-weighted schedule
    Twap,
    /// Off-exchange crossing
    DarkPool,
    /// Do not route
    Reject,
}

impl ExecutionStrategy {
    /// Canonical strategy code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "IMMEDIATE",
            Self::Sliced => "SLICED",
            Self::Iceberg => "ICEBERG",
            Self::Scheduled => "SCHEDULED",
            Self::Smart => "SMART",
            Self::Vwap => "VWAP",
            Self::Twap => "TWAP",
            Self::DarkPool => "DARK_POOL",
            Self::Reject => "REJECT",
        }
    }

    /// Rough time-to-done used for client hints
    #[must_use]
    pub const fn estimated_execution_time(&self) -> Duration {
        match self {
            Self::Immediate => Duration::from_millis(50),
            Self::Smart => Duration::from_millis(100),
            Self::Scheduled => Duration::from_secs(60),
            Self::DarkPool => Duration::from_secs(120),
            Self::Sliced | Self::Iceberg | Self::Vwap | Self::Twap => Duration::from_secs(300),
            Self::Reject => Duration::ZERO,
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size class derived from quantity and the large-order threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSizeClass {
    /// Below a tenth of the threshold
    Small,
    /// Between a tenth of the threshold and the threshold
    Medium,
    /// Above the threshold
    Large,
}

impl OrderSizeClass {
    /// Classify a whole-unit quantity against `large_threshold_units`
    #[must_use]
    pub const fn classify(quantity_units: i64, large_threshold_units: i64) -> Self {
        if quantity_units > large_threshold_units {
            Self::Large
        } else if quantity_units >= large_threshold_units / 10 {
            Self::Medium
        } else {
            Self::Small
        }
    }

    /// Multiplicative score factor for this class
    #[must_use]
    pub const fn score_factor(&self) -> f64 {
        match self {
            Self::Small => 1.0,
            Self::Medium => 0.9,
            Self::Large => 0.7,
        }
    }
}

/// Routing view of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRequest {
    /// External order id, used in logs and errors
    pub order_id: String,
    /// Owning user, for the connectivity probe
    pub user_id: i64,
    /// Instrument
    pub symbol: Symbol,
    /// Exchange the order targets
    pub exchange: Exchange,
    /// Buy or sell
    pub side: Side,
    /// Order type
    pub order_type: OrderType,
    /// Quantity
    pub quantity: Qty,
    /// Effective price from validation, absent for market orders
    pub effective_price: Option<Px>,
}

/// Outcome of one routing pass, owned by the lifecycle engine for the
/// duration of a single placement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Chosen broker
    pub broker_name: String,
    /// Chosen venue code
    pub venue: String,
    /// Chosen execution strategy
    pub strategy: ExecutionStrategy,
    /// True when the strategy executes in one shot
    pub immediate_execution: bool,
    /// Rough time-to-done hint
    pub estimated_execution_time: Duration,
    /// Decision confidence in [0, 1]
    pub confidence: f64,
    /// Human-readable explanation
    pub reason: String,
    /// Fee estimate in currency ticks, zero without an effective price
    pub estimated_fees: i64,
    /// Router that produced the decision
    pub router_name: String,
    /// Time spent routing, milliseconds
    pub processing_time_ms: u64,
}

/// Router tuning, injected at construction
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Name stamped on decisions and metrics
    pub router_name: String,
    /// Broker scored with full base weight
    pub primary_broker: String,
    /// Broker used when the chosen one is unusable
    pub fallback_broker: String,
    /// Large-order threshold in whole units
    pub large_order_units: i64,
    /// Hard cap on a single order, whole units
    pub max_single_order_units: i64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            router_name: "smart_router".to_string(),
            primary_broker: broker_connector::ZERODHA.to_string(),
            fallback_broker: broker_connector::UPSTOX.to_string(),
            large_order_units: routing::DEFAULT_LARGE_ORDER_UNITS,
            max_single_order_units: routing::DEFAULT_MAX_SINGLE_ORDER_UNITS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn size_classification_brackets() {
        let threshold = 10_000;
        assert_eq!(OrderSizeClass::classify(100, threshold), OrderSizeClass::Small);
        assert_eq!(OrderSizeClass::classify(999, threshold), OrderSizeClass::Small);
        assert_eq!(OrderSizeClass::classify(1_000, threshold), OrderSizeClass::Medium);
        assert_eq!(OrderSizeClass::classify(10_000, threshold), OrderSizeClass::Medium);
        assert_eq!(OrderSizeClass::classify(10_001, threshold), OrderSizeClass::Large);
    }

    #[test]
    fn strategy_codes_are_stable() {
        assert_eq!(ExecutionStrategy::Immediate.as_str(), "IMMEDIATE");
        assert_eq!(ExecutionStrategy::DarkPool.as_str(), "DARK_POOL");
        assert_eq!(ExecutionStrategy::Sliced.as_str(), "SLICED");
    }
}
