//! Shared constants: single source of truth for scales, bounds and defaults

/// Fixed-point arithmetic
pub mod fixed_point {
    /// Scale factor for 4 decimal places
    pub const SCALE_4: i64 = 10_000;
    /// Scale factor for 2 decimal places
    pub const SCALE_2: i64 = 100;
    /// Basis points in one whole unit (100%)
    pub const BASIS_POINTS: i64 = 10_000;
}

/// Time conversions
pub mod time {
    /// Milliseconds per second
    pub const MILLIS_PER_SEC: u64 = 1_000;
    /// Seconds per minute
    pub const SECS_PER_MINUTE: u64 = 60;
    /// IST offset from UTC in seconds (+05:30)
    pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;
    /// NSE/BSE equity close, hour component (IST)
    pub const MARKET_CLOSE_HOUR_IST: u32 = 15;
    /// NSE/BSE equity close, minute component (IST)
    pub const MARKET_CLOSE_MINUTE_IST: u32 = 30;
    /// NSE/BSE equity open, hour component (IST)
    pub const MARKET_OPEN_HOUR_IST: u32 = 9;
    /// NSE/BSE equity open, minute component (IST)
    pub const MARKET_OPEN_MINUTE_IST: u32 = 15;
}

/// Order-level bounds enforced by validation
pub mod trading {
    use super::fixed_point::SCALE_4;

    /// Minimum order quantity in whole units
    pub const MIN_ORDER_UNITS: i64 = 1;
    /// Maximum order quantity in whole units
    pub const MAX_ORDER_UNITS: i64 = 1_000_000;
    /// Exclusive lower price bound in ticks (0.01)
    pub const MIN_PRICE_TICKS: i64 = SCALE_4 / 100;
    /// Inclusive upper price bound in ticks (100000.00)
    pub const MAX_PRICE_TICKS: i64 = 100_000 * SCALE_4;
    /// Maximum order notional in currency ticks (10,000,000.0000 INR)
    pub const MAX_ORDER_NOTIONAL_TICKS: i64 = 10_000_000 * SCALE_4;
    /// Maximum symbol length
    pub const MAX_SYMBOL_LEN: usize = 20;
}

/// Routing defaults
pub mod routing {
    /// Orders above this many whole units are classed LARGE
    pub const DEFAULT_LARGE_ORDER_UNITS: i64 = 10_000;
    /// Hard cap on a single routed order, whole units
    pub const DEFAULT_MAX_SINGLE_ORDER_UNITS: i64 = 100_000;
    /// Confidence attached to fallback routing decisions
    pub const FALLBACK_CONFIDENCE: f64 = 0.7;
    /// Fee estimate for brokers without a schedule entry, in hundredths of a bp
    pub const DEFAULT_FEE_CENTIBPS: i64 = 500;
}

/// Circuit breaker and broker call defaults
pub mod resilience {
    /// Consecutive failures before the breaker opens
    pub const DEFAULT_FAILURE_THRESHOLD: u64 = 5;
    /// How long the breaker stays open before probing, milliseconds
    pub const DEFAULT_OPEN_DURATION_MS: u64 = 30_000;
    /// Consecutive half-open successes required to close
    pub const DEFAULT_HALF_OPEN_SUCCESSES: u64 = 3;
    /// Probe calls admitted while half-open
    pub const DEFAULT_HALF_OPEN_PROBES: u64 = 3;
    /// Rolling failure-rate window, milliseconds
    pub const DEFAULT_ROLLING_WINDOW_MS: u64 = 60_000;
    /// Failure rate within the window that opens the breaker
    pub const DEFAULT_FAILURE_RATE_THRESHOLD: f64 = 0.5;
    /// Minimum calls in the window before the rate trip applies
    pub const MIN_WINDOW_CALLS: u64 = 10;
    /// Broker submit deadline, milliseconds
    pub const DEFAULT_SUBMIT_TIMEOUT_MS: u64 = 2_000;
    /// Broker cancel deadline, milliseconds
    pub const DEFAULT_CANCEL_TIMEOUT_MS: u64 = 1_000;
    /// Broker modify deadline, milliseconds
    pub const DEFAULT_MODIFY_TIMEOUT_MS: u64 = 2_000;
}

/// Latency budgets per public operation, milliseconds
pub mod sla {
    /// Place order budget
    pub const PLACE_MS: u64 = 100;
    /// Modify order budget
    pub const MODIFY_MS: u64 = 200;
    /// Cancel order budget
    pub const CANCEL_MS: u64 = 200;
}

/// Scheduler cadences
pub mod scheduler {
    /// Expiration sweep interval, seconds
    pub const EXPIRY_SWEEP_SECS: u64 = 60;
    /// Broker health probe interval, seconds
    pub const HEALTH_PROBE_SECS: u64 = 10;
    /// Cancel reconciler interval, seconds
    pub const CANCEL_RECONCILE_SECS: u64 = 15;
    /// CancelPending age before the reconciler retries, seconds
    pub const CANCEL_RECONCILE_AGE_SECS: u64 = 30;
}
