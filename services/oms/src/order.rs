//! Order entity and request/response shapes

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use services_common::{
    Exchange, OrderType, Px, Qty, Side, Symbol, TimeInForce, TradeError, TradeResult,
};
use std::fmt;
use std::str::FromStr;

/// Order lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Built, never persisted
    New,
    /// Persisted, not yet with a broker
    Pending,
    /// Broker accepted the order
    Acknowledged,
    /// Some quantity executed
    PartiallyFilled,
    /// Full quantity executed
    Filled,
    /// Cancel requested, broker confirmation outstanding
    CancelPending,
    /// Cancel confirmed
    Cancelled,
    /// Refused pre-acknowledgment or by business rules
    Rejected,
    /// Lapsed by time in force
    Expired,
}

impl OrderStatus {
    /// Canonical status code
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Pending => "PENDING",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::CancelPending => "CANCEL_PENDING",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Terminal states admit no further transitions
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Every persisted non-terminal state
    #[must_use]
    pub const fn active_set() -> [Self; 4] {
        [
            Self::Pending,
            Self::Acknowledged,
            Self::PartiallyFilled,
            Self::CancelPending,
        ]
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(Self::New),
            "PENDING" => Ok(Self::Pending),
            "ACKNOWLEDGED" => Ok(Self::Acknowledged),
            "PARTIALLY_FILLED" => Ok(Self::PartiallyFilled),
            "FILLED" => Ok(Self::Filled),
            "CANCEL_PENDING" => Ok(Self::CancelPending),
            "CANCELLED" => Ok(Self::Cancelled),
            "REJECTED" => Ok(Self::Rejected),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err("unknown order status"),
        }
    }
}

/// Inbound order request, validated before anything else touches it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Raw ticker, validated against the symbol rules
    pub symbol: String,
    /// Target exchange
    pub exchange: Exchange,
    /// Buy or sell
    pub side: Side,
    /// Order type
    pub order_type: OrderType,
    /// Quantity in whole shares
    pub quantity: i64,
    /// Limit price, required for LIMIT and STOP_LIMIT
    pub limit_price: Option<Px>,
    /// Stop price, required for STOP_LOSS and STOP_LIMIT
    pub stop_price: Option<Px>,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Expiry date, present iff time in force is GTD
    pub expiry_date: Option<NaiveDate>,
}

/// Validation output: typed fields plus the computed effective price
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    /// Validated ticker
    pub symbol: Symbol,
    /// Target exchange
    pub exchange: Exchange,
    /// Buy or sell
    pub side: Side,
    /// Order type
    pub order_type: OrderType,
    /// Quantity
    pub quantity: Qty,
    /// Limit price
    pub limit_price: Option<Px>,
    /// Stop price
    pub stop_price: Option<Px>,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Expiry date for GTD
    pub expiry_date: Option<NaiveDate>,
    /// Price used for notional and fee math; absent for market orders
    pub effective_price: Option<Px>,
}

/// The central persisted entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Internal numeric id
    pub id: u64,
    /// Stable external id
    pub order_id: String,
    /// Owning user
    pub user_id: i64,
    /// Instrument
    pub symbol: Symbol,
    /// Exchange
    pub exchange: Exchange,
    /// Buy or sell
    pub side: Side,
    /// Order type
    pub order_type: OrderType,
    /// Ordered quantity
    pub quantity: Qty,
    /// Executed quantity
    pub filled_quantity: Qty,
    /// Limit price
    pub limit_price: Option<Px>,
    /// Stop price
    pub stop_price: Option<Px>,
    /// Quantity-weighted average fill price, zero until the first fill
    pub average_price: Px,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Expiry date for GTD orders
    pub expiry_date: Option<NaiveDate>,
    /// Lifecycle state
    pub status: OrderStatus,
    /// Broker the order was routed to
    pub broker_name: Option<String>,
    /// Broker-side order id, set on acknowledgment
    pub broker_order_id: Option<String>,
    /// Reason recorded when the order was rejected
    pub rejection_reason: Option<String>,
    /// Highest broker fill sequence applied; duplicates at or below are
    /// dropped
    pub last_exec_sequence: u64,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last mutation instant
    pub updated_at: DateTime<Utc>,
    /// Broker submission instant
    pub submitted_at: Option<DateTime<Utc>>,
    /// Full-fill instant
    pub executed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter
    pub version: u32,
}

impl Order {
    /// Build a fresh order from a validated request
    #[must_use]
    pub fn create(
        id: u64,
        order_id: String,
        user_id: i64,
        request: &ValidatedRequest,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id,
            user_id,
            symbol: request.symbol.clone(),
            exchange: request.exchange,
            side: request.side,
            order_type: request.order_type,
            quantity: request.quantity,
            filled_quantity: Qty::ZERO,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            average_price: Px::ZERO,
            time_in_force: request.time_in_force,
            expiry_date: request.expiry_date,
            status: OrderStatus::New,
            broker_name: None,
            broker_order_id: None,
            rejection_reason: None,
            last_exec_sequence: 0,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            executed_at: None,
            version: 1,
        }
    }

    /// Unexecuted quantity
    #[must_use]
    pub fn remaining_quantity(&self) -> Qty {
        self.quantity.sub(self.filled_quantity)
    }

    /// True in a terminal state
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold one execution into the quantities and the weighted average
    /// price, moving to PartiallyFilled or Filled as the totals dictate.
    ///
    /// The average is rounded half-up at the fourth decimal so repeated
    /// partial fills agree with `sum(q_i * p_i) / sum(q_i)` to 1e-4.
    pub fn apply_fill(
        &mut self,
        fill_quantity: Qty,
        fill_price: Px,
        now: DateTime<Utc>,
    ) -> TradeResult<()> {
        if !matches!(
            self.status,
            OrderStatus::Acknowledged | OrderStatus::PartiallyFilled
        ) {
            return Err(TradeError::OrderRejected {
                order_id: self.order_id.clone(),
                reason: format!("order not fillable in state {}", self.status),
            });
        }
        if fill_quantity.is_zero() || fill_quantity.as_i64() < 0 {
            return Err(TradeError::OrderRejected {
                order_id: self.order_id.clone(),
                reason: "fill quantity must be positive".to_string(),
            });
        }
        if fill_quantity > self.remaining_quantity() {
            return Err(TradeError::OrderRejected {
                order_id: self.order_id.clone(),
                reason: format!(
                    "fill of {} exceeds remaining {}",
                    fill_quantity,
                    self.remaining_quantity()
                ),
            });
        }

        let new_filled = self.filled_quantity.add(fill_quantity);
        self.average_price = if self.filled_quantity.is_zero() {
            fill_price
        } else {
            weighted_average(
                self.filled_quantity,
                self.average_price,
                fill_quantity,
                fill_price,
            )
        };
        self.filled_quantity = new_filled;

        if self.filled_quantity == self.quantity {
            self.status = OrderStatus::Filled;
            self.executed_at = Some(now);
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Quantity-weighted average of the running average and one new fill,
/// half-up at tick precision
fn weighted_average(old_qty: Qty, old_avg: Px, fill_qty: Qty, fill_px: Px) -> Px {
    let numerator = i128::from(old_qty.as_i64()) * i128::from(old_avg.as_i64())
        + i128::from(fill_qty.as_i64()) * i128::from(fill_px.as_i64());
    let denominator = i128::from(old_qty.as_i64()) + i128::from(fill_qty.as_i64());
    let rounded = (numerator + denominator / 2) / denominator;
    Px::from_i64(i64::try_from(rounded).unwrap_or(i64::MAX))
}

/// One broker execution report consumed by the fill path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillEvent {
    /// Execution id from the broker
    pub execution_id: String,
    /// Executed quantity
    pub quantity: Qty,
    /// Execution price
    pub price: Px,
    /// Broker sequence number; `None` skips stale-detection
    pub sequence: Option<u64>,
}

/// API-facing view of an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    /// External order id
    pub order_id: String,
    /// Lifecycle state
    pub status: OrderStatus,
    /// Instrument
    pub symbol: Symbol,
    /// Exchange
    pub exchange: Exchange,
    /// Buy or sell
    pub side: Side,
    /// Order type
    pub order_type: OrderType,
    /// Ordered quantity in whole shares
    pub quantity: i64,
    /// Executed quantity in whole shares
    pub filled_quantity: i64,
    /// Unexecuted quantity in whole shares
    pub remaining_quantity: i64,
    /// Weighted average fill price
    pub average_price: Px,
    /// Limit price
    pub limit_price: Option<Px>,
    /// Stop price
    pub stop_price: Option<Px>,
    /// Time in force
    pub time_in_force: TimeInForce,
    /// Expiry date for GTD orders
    pub expiry_date: Option<NaiveDate>,
    /// Broker the order went to
    pub broker_name: Option<String>,
    /// Broker-side order id
    pub broker_order_id: Option<String>,
    /// Rejection reason, when rejected
    pub rejection_reason: Option<String>,
    /// Creation instant
    pub created_at: DateTime<Utc>,
    /// Last mutation instant
    pub updated_at: DateTime<Utc>,
    /// Broker submission instant
    pub submitted_at: Option<DateTime<Utc>>,
    /// Full-fill instant
    pub executed_at: Option<DateTime<Utc>>,
    /// True when the operation was accepted in degraded mode (broker not
    /// contacted, reconciliation pending)
    #[serde(default)]
    pub degraded: bool,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            status: order.status,
            symbol: order.symbol.clone(),
            exchange: order.exchange,
            side: order.side,
            order_type: order.order_type,
            quantity: order.quantity.units(),
            filled_quantity: order.filled_quantity.units(),
            remaining_quantity: order.remaining_quantity().units(),
            average_price: order.average_price,
            limit_price: order.limit_price,
            stop_price: order.stop_price,
            time_in_force: order.time_in_force,
            expiry_date: order.expiry_date,
            broker_name: order.broker_name.clone(),
            broker_order_id: order.broker_order_id.clone(),
            rejection_reason: order.rejection_reason.clone(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            submitted_at: order.submitted_at,
            executed_at: order.executed_at,
            degraded: false,
        }
    }
}
