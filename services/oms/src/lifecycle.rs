//! Order state machine and time-in-force expiry rules

use crate::order::{Order, OrderStatus};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use rustc_hash::FxHashMap;
use services_common::TimeInForce;
use services_common::constants::time::{
    IST_OFFSET_SECS, MARKET_CLOSE_HOUR_IST, MARKET_CLOSE_MINUTE_IST, MARKET_OPEN_HOUR_IST,
    MARKET_OPEN_MINUTE_IST,
};
use services_common::{TradeError, TradeResult};
use tracing::debug;

/// Convert an instant to Indian Standard Time
fn ist(at: DateTime<Utc>) -> DateTime<FixedOffset> {
    // +05:30 is always inside FixedOffset's valid range
    let offset = FixedOffset::east_opt(IST_OFFSET_SECS).expect("IST offset is valid");
    at.with_timezone(&offset)
}

/// Calendar date in IST for an instant
#[must_use]
pub fn ist_date(at: DateTime<Utc>) -> NaiveDate {
    ist(at).date_naive()
}

/// True during the NSE/BSE equity session (09:15-15:30 IST)
///
/// Exchange holidays and half-days are an exchange-calendar concern;
/// callers gate on that upstream.
#[must_use]
pub fn is_market_hours(at: DateTime<Utc>) -> bool {
    let local = ist(at).time();
    let open = NaiveTime::from_hms_opt(MARKET_OPEN_HOUR_IST, MARKET_OPEN_MINUTE_IST, 0)
        .unwrap_or(NaiveTime::MIN);
    let close = NaiveTime::from_hms_opt(MARKET_CLOSE_HOUR_IST, MARKET_CLOSE_MINUTE_IST, 0)
        .unwrap_or(NaiveTime::MIN);
    local >= open && local <= close
}

/// Validated transition table over the order state machine
pub struct OrderLifecycle {
    transitions: FxHashMap<OrderStatus, Vec<OrderStatus>>,
}

impl OrderLifecycle {
    /// Build the transition table
    #[must_use]
    pub fn new() -> Self {
        let mut transitions = FxHashMap::default();

        transitions.insert(
            OrderStatus::New,
            vec![OrderStatus::Pending, OrderStatus::Rejected],
        );
        transitions.insert(
            OrderStatus::Pending,
            vec![
                OrderStatus::Acknowledged,
                OrderStatus::Rejected,
                OrderStatus::CancelPending,
                OrderStatus::Cancelled,
                OrderStatus::Expired,
            ],
        );
        transitions.insert(
            OrderStatus::Acknowledged,
            vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::CancelPending,
                OrderStatus::Expired,
            ],
        );
        transitions.insert(
            OrderStatus::PartiallyFilled,
            vec![
                OrderStatus::Filled,
                OrderStatus::CancelPending,
                OrderStatus::Expired,
            ],
        );
        transitions.insert(
            OrderStatus::CancelPending,
            vec![OrderStatus::Cancelled, OrderStatus::Expired],
        );

        // Terminal states have no outgoing transitions
        transitions.insert(OrderStatus::Filled, vec![]);
        transitions.insert(OrderStatus::Cancelled, vec![]);
        transitions.insert(OrderStatus::Rejected, vec![]);
        transitions.insert(OrderStatus::Expired, vec![]);

        Self { transitions }
    }

    /// Check one transition; same-state is a no-op
    pub fn validate_transition(&self, order: &Order, next: OrderStatus) -> TradeResult<()> {
        if order.status == next {
            return Ok(());
        }
        let allowed = self
            .transitions
            .get(&order.status)
            .is_some_and(|targets| targets.contains(&next));
        if allowed {
            debug!(order_id = %order.order_id, from = %order.status, to = %next, "state transition");
            Ok(())
        } else {
            Err(TradeError::OrderRejected {
                order_id: order.order_id.clone(),
                reason: if order.status.is_terminal() {
                    "non-modifiable state".to_string()
                } else {
                    format!("invalid transition {} -> {next}", order.status)
                },
            })
        }
    }

    /// Modify is allowed while the order is working and no cancel is pending
    #[must_use]
    pub const fn can_modify(&self, status: OrderStatus) -> bool {
        matches!(
            status,
            OrderStatus::Pending | OrderStatus::Acknowledged | OrderStatus::PartiallyFilled
        )
    }

    /// Cancel additionally tolerates CancelPending, making retries idempotent
    #[must_use]
    pub const fn can_cancel(&self, status: OrderStatus) -> bool {
        self.can_modify(status) || matches!(status, OrderStatus::CancelPending)
    }

    /// Whether the TIF sweep should expire this order at `now`
    ///
    /// DAY orders lapse once the trading day of their creation has closed
    /// (15:30 IST); GTD orders lapse once their expiry date is in the past.
    #[must_use]
    pub fn should_expire(&self, order: &Order, now: DateTime<Utc>) -> bool {
        if order.is_terminal() {
            return false;
        }
        match order.time_in_force {
            TimeInForce::Day => {
                let created = ist(order.created_at);
                let close = NaiveTime::from_hms_opt(MARKET_CLOSE_HOUR_IST, MARKET_CLOSE_MINUTE_IST, 0)
                    .unwrap_or(NaiveTime::MIN);
                let day_end = created.date_naive().and_time(close);
                ist(now).naive_local() > day_end
            }
            TimeInForce::Gtd => order
                .expiry_date
                .is_some_and(|expiry| expiry < ist_date(now)),
            TimeInForce::Gtc | TimeInForce::Ioc | TimeInForce::Fok => false,
        }
    }
}

impl Default for OrderLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
