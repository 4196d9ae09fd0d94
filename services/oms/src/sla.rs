//! SLA monitor and per-request processing context

use crate::order::OrderRequest;
use chrono::{DateTime, Utc};
use services_common::MetricsRegistry;
use services_common::constants::sla;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Per-operation latency budgets
#[derive(Debug, Clone)]
pub struct SlaConfig {
    /// Place budget, milliseconds
    pub place_ms: u64,
    /// Modify budget, milliseconds
    pub modify_ms: u64,
    /// Cancel budget, milliseconds
    pub cancel_ms: u64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            place_ms: sla::PLACE_MS,
            modify_ms: sla::MODIFY_MS,
            cancel_ms: sla::CANCEL_MS,
        }
    }
}

/// Wraps public operations with a timer and records budget breaches
pub struct SlaMonitor {
    config: SlaConfig,
    metrics: Arc<MetricsRegistry>,
}

impl SlaMonitor {
    /// Monitor recording into `metrics`
    #[must_use]
    pub fn new(config: SlaConfig, metrics: Arc<MetricsRegistry>) -> Self {
        Self { config, metrics }
    }

    fn budget(&self, operation: &str) -> Option<Duration> {
        match operation {
            "place" => Some(Duration::from_millis(self.config.place_ms)),
            "modify" => Some(Duration::from_millis(self.config.modify_ms)),
            "cancel" => Some(Duration::from_millis(self.config.cancel_ms)),
            _ => None,
        }
    }

    /// Record one completed operation; returns true when the budget was
    /// breached
    pub fn observe(&self, operation: &str, correlation_id: &str, elapsed: Duration) -> bool {
        let _ = self.metrics.record_timer(
            "trading.orders.processing_time",
            &[("operation", operation)],
            elapsed,
        );

        let breached = self
            .budget(operation)
            .is_some_and(|budget| elapsed > budget);
        if breached {
            warn!(
                operation,
                correlation_id,
                elapsed_ms = elapsed.as_millis() as u64,
                "operation exceeded its latency budget"
            );
            let _ = self
                .metrics
                .increment("trading.sla.violations", &[("operation", operation)]);
        }
        breached
    }
}

/// In-memory context for one request, threaded through logs and timing
#[derive(Debug, Clone)]
pub struct OrderProcessingContext {
    /// Correlation id attached to every log line of this request
    pub correlation_id: String,
    /// Requesting user
    pub user_id: i64,
    /// Snapshot of the inbound request; absent for cancels and queries
    pub request: Option<OrderRequest>,
    /// Wall-clock arrival
    pub received_at: DateTime<Utc>,
    /// Monotonic start for SLA timing
    pub started: Instant,
}

impl OrderProcessingContext {
    /// Open a context for one request
    #[must_use]
    pub fn new(
        correlation_id: String,
        user_id: i64,
        request: Option<OrderRequest>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            correlation_id,
            user_id,
            request,
            received_at,
            started: Instant::now(),
        }
    }

    /// Time spent so far
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
