//! Metrics sink with a bounded label schema
//!
//! Counters, gauges and timers keyed by metric name plus a canonicalised
//! label set. Label keys and values are validated against a fixed schema so
//! a mistyped tag cannot explode series cardinality; offending writes are
//! dropped with a warning and an error the caller may inspect.

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Label rejection reasons
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetricsError {
    /// Label key is not part of the schema
    #[error("unknown metric label key: {key}")]
    UnknownLabelKey {
        /// The rejected key
        key: String,
    },

    /// Label value was never registered for its key
    #[error("unknown value '{value}' for metric label {key}")]
    UnknownLabelValue {
        /// The label key
        key: String,
        /// The rejected value
        value: String,
    },
}

/// Allowed label keys and, per key, allowed values
#[derive(Debug, Clone, Default)]
pub struct LabelSchema {
    allowed: FxHashMap<String, FxHashSet<String>>,
}

impl LabelSchema {
    /// Empty schema; rejects every label until keys are allowed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a label key with its closed value set
    #[must_use]
    pub fn allow<I, V>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let set = self
            .allowed
            .entry(key.to_string())
            .or_default();
        for v in values {
            set.insert(v.into());
        }
        self
    }

    /// Validate one label set against the schema
    pub fn validate(&self, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        for (key, value) in labels {
            let Some(values) = self.allowed.get(*key) else {
                return Err(MetricsError::UnknownLabelKey {
                    key: (*key).to_string(),
                });
            };
            if !values.contains(*value) {
                return Err(MetricsError::UnknownLabelValue {
                    key: (*key).to_string(),
                    value: (*value).to_string(),
                });
            }
        }
        Ok(())
    }

    /// Schema for the order lifecycle services: operation, broker, exchange,
    /// strategy, outcome, error type, router and the immediate flag.
    #[must_use]
    pub fn trading_default<I, S>(brokers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new()
            .allow("operation", ["place", "modify", "cancel", "fill", "expire", "route"])
            .allow("broker", brokers.into_iter().map(Into::into).chain(["NONE".to_string()]))
            .allow("exchange", ["NSE", "BSE", "MCX"])
            .allow(
                "strategy",
                [
                    "IMMEDIATE",
                    "SLICED",
                    "ICEBERG",
                    "SCHEDULED",
                    "SMART",
                    "VWAP",
                    "TWAP",
                    "DARK_POOL",
                    "REJECT",
                ],
            )
            .allow("outcome", ["success", "failure", "degraded"])
            .allow(
                "error_type",
                [
                    "VALIDATION_FAILED",
                    "RISK_DECLINED",
                    "ORDER_REJECTED",
                    "CONCURRENT_MODIFICATION",
                    "BROKER_ERROR",
                    "SERVICE_UNAVAILABLE",
                    "STORAGE_FAILURE",
                    "ORDER_NOT_FOUND",
                    "INTERNAL_ERROR",
                ],
            )
            .allow("router", ["smart_router"])
            .allow("immediate", ["true", "false"])
    }
}

/// Aggregated view of one timer series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimerStats {
    /// Number of recorded samples
    pub count: u64,
    /// Mean sample duration in milliseconds
    pub avg_ms: f64,
    /// Largest sample in milliseconds
    pub max_ms: u64,
}

#[derive(Debug)]
struct DurationTracker {
    total: Duration,
    max: Duration,
    count: u64,
}

impl DurationTracker {
    const fn new() -> Self {
        Self {
            total: Duration::ZERO,
            max: Duration::ZERO,
            count: 0,
        }
    }

    fn record(&mut self, sample: Duration) {
        self.total += sample;
        self.max = self.max.max(sample);
        self.count += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn stats(&self) -> TimerStats {
        let avg_ms = if self.count > 0 {
            self.total.as_millis() as f64 / self.count as f64
        } else {
            0.0
        };
        TimerStats {
            count: self.count,
            avg_ms,
            max_ms: u64::try_from(self.max.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Concurrent counter/gauge/timer registry
pub struct MetricsRegistry {
    schema: LabelSchema,
    counters: RwLock<FxHashMap<String, AtomicU64>>,
    gauges: RwLock<FxHashMap<String, AtomicI64>>,
    timers: RwLock<FxHashMap<String, DurationTracker>>,
    started: Instant,
}

impl MetricsRegistry {
    /// Create a registry bounded by `schema`
    #[must_use]
    pub fn new(schema: LabelSchema) -> Self {
        Self {
            schema,
            counters: RwLock::new(FxHashMap::default()),
            gauges: RwLock::new(FxHashMap::default()),
            timers: RwLock::new(FxHashMap::default()),
            started: Instant::now(),
        }
    }

    fn series_key(name: &str, labels: &[(&str, &str)]) -> String {
        if labels.is_empty() {
            return name.to_string();
        }
        let mut sorted: Vec<_> = labels.to_vec();
        sorted.sort_unstable_by_key(|(k, _)| *k);
        let rendered: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{name}{{{}}}", rendered.join(","))
    }

    fn checked_key(&self, name: &str, labels: &[(&str, &str)]) -> Result<String, MetricsError> {
        self.schema.validate(labels).map_err(|e| {
            warn!(metric = name, error = %e, "dropping metric write with unregistered label");
            e
        })?;
        Ok(Self::series_key(name, labels))
    }

    /// Increment a counter by one
    pub fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        self.add(name, labels, 1)
    }

    /// Increment a counter by `delta`
    pub fn add(&self, name: &str, labels: &[(&str, &str)], delta: u64) -> Result<(), MetricsError> {
        let key = self.checked_key(name, labels)?;
        let counters = self.counters.read();
        if let Some(counter) = counters.get(&key) {
            counter.fetch_add(delta, Ordering::Relaxed);
        } else {
            drop(counters);
            self.counters
                .write()
                .entry(key)
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(delta, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Current value of a counter series
    #[must_use]
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = Self::series_key(name, labels);
        self.counters
            .read()
            .get(&key)
            .map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Move a gauge by `delta` (may be negative)
    pub fn gauge_add(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        delta: i64,
    ) -> Result<(), MetricsError> {
        let key = self.checked_key(name, labels)?;
        let gauges = self.gauges.read();
        if let Some(gauge) = gauges.get(&key) {
            gauge.fetch_add(delta, Ordering::Relaxed);
        } else {
            drop(gauges);
            self.gauges
                .write()
                .entry(key)
                .or_insert_with(|| AtomicI64::new(0))
                .fetch_add(delta, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Current value of a gauge series
    #[must_use]
    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> i64 {
        let key = Self::series_key(name, labels);
        self.gauges
            .read()
            .get(&key)
            .map_or(0, |g| g.load(Ordering::Relaxed))
    }

    /// Record one timer sample
    pub fn record_timer(
        &self,
        name: &str,
        labels: &[(&str, &str)],
        sample: Duration,
    ) -> Result<(), MetricsError> {
        let key = self.checked_key(name, labels)?;
        self.timers
            .write()
            .entry(key)
            .or_insert_with(DurationTracker::new)
            .record(sample);
        Ok(())
    }

    /// Aggregated stats for a timer series
    #[must_use]
    pub fn timer(&self, name: &str, labels: &[(&str, &str)]) -> Option<TimerStats> {
        let key = Self::series_key(name, labels);
        self.timers.read().get(&key).map(DurationTracker::stats)
    }

    /// Point-in-time snapshot of every series
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        let gauges = self
            .gauges
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
            .collect();
        let timers = self
            .timers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.stats()))
            .collect();

        MetricsSnapshot {
            uptime_seconds: self.started.elapsed().as_secs(),
            counters,
            gauges,
            timers,
        }
    }
}

/// Serializable registry snapshot for operator dashboards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Seconds since the registry was created
    pub uptime_seconds: u64,
    /// Counter series by canonical key
    pub counters: FxHashMap<String, u64>,
    /// Gauge series by canonical key
    pub gauges: FxHashMap<String, i64>,
    /// Timer series by canonical key
    pub timers: FxHashMap<String, TimerStats>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> MetricsRegistry {
        MetricsRegistry::new(LabelSchema::trading_default(["ZERODHA", "UPSTOX"]))
    }

    #[test]
    fn counter_series_are_label_keyed() {
        let metrics = registry();
        metrics
            .increment("trading.orders.placed", &[("broker", "ZERODHA")])
            .unwrap();
        metrics
            .increment("trading.orders.placed", &[("broker", "ZERODHA")])
            .unwrap();
        metrics
            .increment("trading.orders.placed", &[("broker", "UPSTOX")])
            .unwrap();

        assert_eq!(
            metrics.counter("trading.orders.placed", &[("broker", "ZERODHA")]),
            2
        );
        assert_eq!(
            metrics.counter("trading.orders.placed", &[("broker", "UPSTOX")]),
            1
        );
    }

    #[test]
    fn label_order_does_not_split_series() {
        let metrics = registry();
        metrics
            .increment(
                "trading.routing.decisions",
                &[("broker", "ZERODHA"), ("strategy", "IMMEDIATE")],
            )
            .unwrap();
        metrics
            .increment(
                "trading.routing.decisions",
                &[("strategy", "IMMEDIATE"), ("broker", "ZERODHA")],
            )
            .unwrap();

        assert_eq!(
            metrics.counter(
                "trading.routing.decisions",
                &[("broker", "ZERODHA"), ("strategy", "IMMEDIATE")],
            ),
            2
        );
    }

    #[test]
    fn unknown_labels_are_rejected() {
        let metrics = registry();
        let err = metrics
            .increment("trading.orders.placed", &[("venue", "NSE")])
            .unwrap_err();
        assert_eq!(
            err,
            MetricsError::UnknownLabelKey {
                key: "venue".into()
            }
        );

        let err = metrics
            .increment("trading.orders.placed", &[("broker", "UNREGISTERED")])
            .unwrap_err();
        assert!(matches!(err, MetricsError::UnknownLabelValue { .. }));
        // Rejected writes leave no series behind
        assert_eq!(
            metrics.counter("trading.orders.placed", &[("broker", "UNREGISTERED")]),
            0
        );
    }

    #[test]
    fn gauges_move_both_ways() {
        let metrics = registry();
        metrics.gauge_add("trading.orders.active", &[], 3).unwrap();
        metrics.gauge_add("trading.orders.active", &[], -1).unwrap();
        assert_eq!(metrics.gauge("trading.orders.active", &[]), 2);
    }

    #[test]
    fn timer_stats_aggregate() {
        let metrics = registry();
        let labels = [("operation", "place")];
        metrics
            .record_timer("trading.orders.processing_time", &labels, Duration::from_millis(40))
            .unwrap();
        metrics
            .record_timer("trading.orders.processing_time", &labels, Duration::from_millis(80))
            .unwrap();

        let stats = metrics
            .timer("trading.orders.processing_time", &labels)
            .unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.max_ms, 80);
        assert!((stats.avg_ms - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn snapshot_contains_all_series() {
        let metrics = registry();
        metrics
            .increment("trading.orders.placed", &[("broker", "ZERODHA")])
            .unwrap();
        metrics.gauge_add("trading.orders.active", &[], 1).unwrap();
        metrics
            .record_timer(
                "trading.routing",
                &[("router", "smart_router")],
                Duration::from_millis(2),
            )
            .unwrap();

        let snap = metrics.snapshot();
        assert_eq!(snap.counters.len(), 1);
        assert_eq!(snap.gauges.len(), 1);
        assert_eq!(snap.timers.len(), 1);
        assert_eq!(
            snap.counters["trading.orders.placed{broker=ZERODHA}"],
            1
        );
    }
}
