//! Broker connectivity layer
//!
//! Everything the order lifecycle engine needs to talk to external brokers:
//! - Capability and health registry (which brokers serve which exchanges)
//! - Per-broker circuit breakers with fail-fast and probing recovery
//! - Deadline-bounded submit/modify/cancel gateway with graceful
//!   degradation on the cancel path
//! - A deterministic paper connector for wiring and tests

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod circuit;
pub mod client;
pub mod paper;
pub mod registry;

pub use auth::{AlwaysLinkedAuth, BrokerAuthService, BrokerConnection};
pub use circuit::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{
    BrokerAck, BrokerApi, BrokerGateway, CancelOutcome, GatewayConfig, ModifyTicket, OrderTicket,
};
pub use paper::PaperBroker;
pub use registry::{
    ANGEL_ONE, BrokerCapability, BrokerRegistry, BrokerStatus, ConnectionState, UPSTOX, ZERODHA,
};
