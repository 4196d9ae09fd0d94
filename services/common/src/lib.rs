//! Shared building blocks for the trading services
//!
//! Domain vocabulary (fixed-point prices and quantities, symbols, exchanges,
//! order attributes), the closed error taxonomy, the bounded-label metrics
//! registry, and injectable time/id sources.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod clock;
pub mod constants;
pub mod errors;
pub mod ids;
pub mod metrics;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{BrokerError, ErrorResponse, TradeError, TradeResult, ValidationFailure};
pub use ids::OrderIds;
pub use metrics::{LabelSchema, MetricsRegistry, MetricsSnapshot, TimerStats};
pub use types::{Exchange, OrderType, Px, Qty, Side, Symbol, TimeInForce};
