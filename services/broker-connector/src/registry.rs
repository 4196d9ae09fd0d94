//! Broker capability and health registry
//!
//! Capabilities (exchanges served, fee schedule) are fixed at construction;
//! runtime health is updated by the gateway and the scheduler's probes and
//! read copy-on-read by the router, so every routing decision sees a
//! consistent snapshot.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use services_common::{Clock, Exchange};
use std::sync::Arc;
use tracing::{debug, warn};

/// Zerodha broker name
pub const ZERODHA: &str = "ZERODHA";
/// Upstox broker name
pub const UPSTOX: &str = "UPSTOX";
/// Angel One broker name
pub const ANGEL_ONE: &str = "ANGEL_ONE";

/// Consecutive failures after which a broker is considered disconnected
const DISCONNECT_FAILURES: u32 = 3;
/// Health restored per successful call
const HEALTH_RECOVERY_STEP: u8 = 10;
/// Health lost per failed call
const HEALTH_PENALTY_STEP: u8 = 20;

/// Broker connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Healthy and accepting orders
    Connected,
    /// Reachable but failing intermittently
    Degraded,
    /// Not reachable
    Disconnected,
    /// Administratively offline
    Maintenance,
}

/// Runtime health of one broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerStatus {
    /// Connection state
    pub state: ConnectionState,
    /// Health score 0-100
    pub health_score: u8,
    /// Consecutive failed calls
    pub consecutive_failures: u32,
    /// Last successful contact
    pub last_heartbeat: DateTime<Utc>,
}

impl BrokerStatus {
    /// Usable brokers accept new orders; degraded still counts, the router
    /// down-weights it via the health score instead.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.state, ConnectionState::Connected | ConnectionState::Degraded)
    }
}

/// Static capability entry for one broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerCapability {
    /// Broker name
    pub name: String,
    /// Exchanges this broker can route to
    pub exchanges: Vec<Exchange>,
    /// Fee estimate in hundredths of a basis point
    pub fee_centibps: i64,
}

/// Capability map plus live health, shared between router and gateway
pub struct BrokerRegistry {
    /// Insertion-ordered so candidate lists (and score tie-breaks) are
    /// deterministic
    capabilities: Vec<BrokerCapability>,
    index: FxHashMap<String, usize>,
    status: DashMap<String, BrokerStatus>,
    clock: Arc<dyn Clock>,
}

impl BrokerRegistry {
    /// Build a registry from a fixed capability list; every broker starts
    /// connected at full health.
    #[must_use]
    pub fn new(capabilities: Vec<BrokerCapability>, clock: Arc<dyn Clock>) -> Self {
        let index = capabilities
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.clone(), i))
            .collect();
        let status = DashMap::new();
        let now = clock.now();
        for cap in &capabilities {
            status.insert(
                cap.name.clone(),
                BrokerStatus {
                    state: ConnectionState::Connected,
                    health_score: 100,
                    consecutive_failures: 0,
                    last_heartbeat: now,
                },
            );
        }
        Self {
            capabilities,
            index,
            status,
            clock,
        }
    }

    /// The standard Indian-market broker set: Zerodha (NSE/BSE/MCX, 3 bps),
    /// Upstox (NSE/BSE, 2 bps), Angel One (NSE/BSE/MCX, 2.5 bps).
    #[must_use]
    pub fn indian_default(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            vec![
                BrokerCapability {
                    name: ZERODHA.to_string(),
                    exchanges: vec![Exchange::Nse, Exchange::Bse, Exchange::Mcx],
                    fee_centibps: 300,
                },
                BrokerCapability {
                    name: UPSTOX.to_string(),
                    exchanges: vec![Exchange::Nse, Exchange::Bse],
                    fee_centibps: 200,
                },
                BrokerCapability {
                    name: ANGEL_ONE.to_string(),
                    exchanges: vec![Exchange::Nse, Exchange::Bse, Exchange::Mcx],
                    fee_centibps: 250,
                },
            ],
            clock,
        )
    }

    /// All registered broker names, in registration order
    #[must_use]
    pub fn brokers(&self) -> Vec<String> {
        self.capabilities.iter().map(|c| c.name.clone()).collect()
    }

    /// Capability entry for a broker
    #[must_use]
    pub fn capability(&self, broker: &str) -> Option<&BrokerCapability> {
        self.index.get(broker).map(|&i| &self.capabilities[i])
    }

    /// Brokers able to route to `exchange`, in registration order
    #[must_use]
    pub fn brokers_for_exchange(&self, exchange: Exchange) -> Vec<String> {
        self.capabilities
            .iter()
            .filter(|c| c.exchanges.contains(&exchange))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Fee estimate for a broker in hundredths of a basis point
    #[must_use]
    pub fn fee_centibps(&self, broker: &str) -> i64 {
        self.capability(broker)
            .map_or(services_common::constants::routing::DEFAULT_FEE_CENTIBPS, |c| {
                c.fee_centibps
            })
    }

    /// Copy-on-read status for one broker
    #[must_use]
    pub fn status(&self, broker: &str) -> Option<BrokerStatus> {
        self.status.get(broker).map(|s| s.clone())
    }

    /// Copy-on-read status for every broker
    #[must_use]
    pub fn status_snapshot(&self) -> FxHashMap<String, BrokerStatus> {
        self.status
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// True when the broker is registered and currently usable
    #[must_use]
    pub fn is_usable(&self, broker: &str) -> bool {
        self.status(broker).is_some_and(|s| s.is_usable())
    }

    /// Record a successful broker interaction
    pub fn record_success(&self, broker: &str) {
        if let Some(mut status) = self.status.get_mut(broker) {
            status.consecutive_failures = 0;
            status.health_score = status.health_score.saturating_add(HEALTH_RECOVERY_STEP).min(100);
            if status.state != ConnectionState::Maintenance {
                status.state = ConnectionState::Connected;
            }
            status.last_heartbeat = self.clock.now();
        }
    }

    /// Record a failed broker interaction
    pub fn record_failure(&self, broker: &str) {
        if let Some(mut status) = self.status.get_mut(broker) {
            status.consecutive_failures += 1;
            status.health_score = status.health_score.saturating_sub(HEALTH_PENALTY_STEP);
            if status.state != ConnectionState::Maintenance {
                status.state = if status.consecutive_failures >= DISCONNECT_FAILURES {
                    ConnectionState::Disconnected
                } else {
                    ConnectionState::Degraded
                };
            }
            warn!(
                broker,
                failures = status.consecutive_failures,
                health = status.health_score,
                "broker interaction failed"
            );
        }
    }

    /// Force a state, used for maintenance windows
    pub fn set_state(&self, broker: &str, state: ConnectionState) {
        if let Some(mut status) = self.status.get_mut(broker) {
            debug!(broker, ?state, "broker state set");
            status.state = state;
        }
    }
}
