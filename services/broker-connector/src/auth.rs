//! Broker account-linkage contract
//!
//! Whether a user holds a live session with a broker is decided by the auth
//! service; the router only consumes the usable flag during its
//! connectivity probe.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use services_common::TradeResult;

/// A user's connection to one broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConnection {
    /// Broker name
    pub broker: String,
    /// True when the session can accept orders right now
    pub usable: bool,
}

/// Lookup of user-broker connectivity
#[async_trait]
pub trait BrokerAuthService: Send + Sync {
    /// Connection status for `user_id` at `broker`
    async fn broker_connection(&self, user_id: i64, broker: &str) -> TradeResult<BrokerConnection>;
}

/// Treats every user as linked to every broker; default wiring for
/// environments without an auth service.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysLinkedAuth;

#[async_trait]
impl BrokerAuthService for AlwaysLinkedAuth {
    async fn broker_connection(&self, _user_id: i64, broker: &str) -> TradeResult<BrokerConnection> {
        Ok(BrokerConnection {
            broker: broker.to_string(),
            usable: true,
        })
    }
}
