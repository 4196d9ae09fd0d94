//! Per-broker circuit breaker
//!
//! Closed -> Open on consecutive failures or window failure rate;
//! Open fails fast until the open duration elapses, then Half-Open admits a
//! bounded number of probe calls. Probe failure re-opens, enough probe
//! successes close. Each broker owns an independent breaker; no state is
//! shared across brokers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use services_common::Clock;
use services_common::constants::resilience;
use std::sync::Arc;
use tracing::{info, warn};

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls fail fast
    Open,
    /// Limited probe calls allowed
    HalfOpen,
}

/// Breaker tuning
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker
    pub failure_threshold: u64,
    /// Failure rate within the rolling window that opens the breaker
    pub failure_rate_threshold: f64,
    /// Rolling window width, milliseconds
    pub rolling_window_ms: u64,
    /// Minimum calls in the window before the rate trip applies
    pub min_window_calls: u64,
    /// Time spent open before probing, milliseconds
    pub open_duration_ms: u64,
    /// Probe calls admitted while half-open
    pub half_open_probes: u64,
    /// Consecutive probe successes required to close
    pub half_open_successes: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: resilience::DEFAULT_FAILURE_THRESHOLD,
            failure_rate_threshold: resilience::DEFAULT_FAILURE_RATE_THRESHOLD,
            rolling_window_ms: resilience::DEFAULT_ROLLING_WINDOW_MS,
            min_window_calls: resilience::MIN_WINDOW_CALLS,
            open_duration_ms: resilience::DEFAULT_OPEN_DURATION_MS,
            half_open_probes: resilience::DEFAULT_HALF_OPEN_PROBES,
            half_open_successes: resilience::DEFAULT_HALF_OPEN_SUCCESSES,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u64,
    opened_at_ms: u64,
    window_start_ms: u64,
    window_calls: u64,
    window_failures: u64,
    probes_in_flight: u64,
    probe_successes: u64,
}

/// Independent breaker for one broker
pub struct CircuitBreaker {
    broker: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a closed breaker for `broker`
    #[must_use]
    pub fn new(broker: &str, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now_millis();
        Self {
            broker: broker.to_string(),
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at_ms: 0,
                window_start_ms: now,
                window_calls: 0,
                window_failures: 0,
                probes_in_flight: 0,
                probe_successes: 0,
            }),
        }
    }

    /// Current state, applying the Open -> HalfOpen timeout transition
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Whether a call may go out now. Admitting a call while half-open
    /// reserves one probe slot; the caller must follow up with
    /// `record_success` or `record_failure`.
    #[must_use]
    pub fn allow_call(&self) -> bool {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probes_in_flight < self.config.half_open_probes {
                    inner.probes_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record the outcome of an admitted call that succeeded
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                self.roll_window(&mut inner);
                inner.window_calls += 1;
            }
            CircuitState::HalfOpen => {
                inner.probes_in_flight = inner.probes_in_flight.saturating_sub(1);
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.half_open_successes {
                    info!(broker = %self.broker, "circuit closed after successful probes");
                    self.reset_closed(&mut inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record the outcome of an admitted call that failed
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                self.roll_window(&mut inner);
                inner.window_calls += 1;
                inner.window_failures += 1;
                if self.should_trip(&inner) {
                    warn!(
                        broker = %self.broker,
                        consecutive = inner.consecutive_failures,
                        window_failures = inner.window_failures,
                        window_calls = inner.window_calls,
                        "circuit opened"
                    );
                    self.open(&mut inner);
                }
            }
            CircuitState::HalfOpen => {
                warn!(broker = %self.broker, "probe failed, circuit re-opened");
                self.open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn refresh(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open {
            let now = self.clock.now_millis();
            if now >= inner.opened_at_ms + self.config.open_duration_ms {
                info!(broker = %self.broker, "circuit half-open, admitting probes");
                inner.state = CircuitState::HalfOpen;
                inner.probes_in_flight = 0;
                inner.probe_successes = 0;
            }
        }
    }

    fn roll_window(&self, inner: &mut BreakerInner) {
        let now = self.clock.now_millis();
        if now.saturating_sub(inner.window_start_ms) > self.config.rolling_window_ms {
            inner.window_start_ms = now;
            inner.window_calls = 0;
            inner.window_failures = 0;
        }
    }

    fn should_trip(&self, inner: &BreakerInner) -> bool {
        if inner.consecutive_failures >= self.config.failure_threshold {
            return true;
        }
        if inner.window_calls >= self.config.min_window_calls {
            #[allow(clippy::cast_precision_loss)]
            let rate = inner.window_failures as f64 / inner.window_calls as f64;
            return rate >= self.config.failure_rate_threshold;
        }
        false
    }

    fn open(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Open;
        inner.opened_at_ms = self.clock.now_millis();
        inner.probes_in_flight = 0;
        inner.probe_successes = 0;
    }

    fn reset_closed(&self, inner: &mut BreakerInner) {
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.window_start_ms = self.clock.now_millis();
        inner.window_calls = 0;
        inner.window_failures = 0;
        inner.probes_in_flight = 0;
        inner.probe_successes = 0;
    }
}
