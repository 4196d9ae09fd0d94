//! Routing error types

use services_common::TradeError;
use thiserror::Error;

/// Failures the routing pipeline can surface
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    /// Quantity exceeds the single-order cap
    #[error("order of {quantity_units} units exceeds the single-order cap of {max_units}")]
    OrderTooLarge {
        /// Requested whole-unit quantity
        quantity_units: i64,
        /// Configured cap in whole units
        max_units: i64,
    },

    /// No registered broker serves the exchange
    #[error("no broker available for exchange {exchange}")]
    NoBrokerAvailable {
        /// Exchange that has no serving broker
        exchange: String,
    },

    /// Both the chosen broker and the fallback are unusable
    #[error("broker {broker} unusable and fallback {fallback} unavailable")]
    BrokerConnectivity {
        /// Broker chosen by scoring
        broker: String,
        /// Configured fallback broker
        fallback: String,
    },
}

impl RoutingError {
    /// Map into the engine-level taxonomy for a specific order
    #[must_use]
    pub fn into_trade_error(self, order_id: &str) -> TradeError {
        match self {
            Self::OrderTooLarge { .. } | Self::NoBrokerAvailable { .. } => {
                TradeError::OrderRejected {
                    order_id: order_id.to_string(),
                    reason: self.to_string(),
                }
            }
            Self::BrokerConnectivity { fallback, .. } => TradeError::ServiceUnavailable {
                broker: fallback,
            },
        }
    }
}
