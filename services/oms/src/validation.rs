//! Order request validation, the entry gate of the lifecycle engine
//!
//! Checks run in a fixed order and the first failure wins: field bounds,
//! the per-type price matrix, TIF/expiry coherence, then the notional cap.

use crate::lifecycle::ist_date;
use crate::order::{OrderRequest, ValidatedRequest};
use chrono::{DateTime, Utc};
use services_common::constants::trading::{
    MAX_ORDER_UNITS, MAX_PRICE_TICKS, MIN_ORDER_UNITS, MIN_PRICE_TICKS,
};
use services_common::{OrderType, Px, Qty, Side, Symbol, TimeInForce, TradeError, TradeResult};

/// Stateless validator, parameterised by the notional cap
#[derive(Debug, Clone)]
pub struct OrderValidator {
    max_notional_ticks: i64,
}

fn invalid(field: &str, constraint: &str, rejected: impl ToString) -> TradeError {
    TradeError::Validation {
        field: field.to_string(),
        constraint: constraint.to_string(),
        rejected_value: rejected.to_string(),
    }
}

impl OrderValidator {
    /// Validator enforcing `max_notional_ticks` on the effective order value
    #[must_use]
    pub const fn new(max_notional_ticks: i64) -> Self {
        Self { max_notional_ticks }
    }

    /// Validate a request, computing its effective price
    pub fn validate(&self, request: &OrderRequest, now: DateTime<Utc>) -> TradeResult<ValidatedRequest> {
        // 1. Field presence and bounds
        let symbol = Symbol::parse(&request.symbol)
            .map_err(|reason| invalid("symbol", reason, &request.symbol))?;

        if !(MIN_ORDER_UNITS..=MAX_ORDER_UNITS).contains(&request.quantity) {
            return Err(invalid(
                "quantity",
                "must be between 1 and 1000000",
                request.quantity,
            ));
        }
        let quantity = Qty::from_units(request.quantity);

        if let Some(price) = request.limit_price {
            check_price_bounds("limit_price", price)?;
        }
        if let Some(price) = request.stop_price {
            check_price_bounds("stop_price", price)?;
        }

        // 2. Price-requirement matrix by order type
        let effective_price = match request.order_type {
            OrderType::Market => None,
            OrderType::Limit => Some(request.limit_price.ok_or_else(|| {
                invalid("limit_price", "required for LIMIT orders", "<missing>")
            })?),
            OrderType::StopLoss => Some(request.stop_price.ok_or_else(|| {
                invalid("stop_price", "required for STOP_LOSS orders", "<missing>")
            })?),
            OrderType::StopLimit => {
                let limit = request.limit_price.ok_or_else(|| {
                    invalid("limit_price", "required for STOP_LIMIT orders", "<missing>")
                })?;
                let stop = request.stop_price.ok_or_else(|| {
                    invalid("stop_price", "required for STOP_LIMIT orders", "<missing>")
                })?;
                match request.side {
                    Side::Buy if stop < limit => {
                        return Err(invalid(
                            "stop_price",
                            "must be at or above the limit price for STOP_LIMIT buys",
                            stop,
                        ));
                    }
                    Side::Sell if stop > limit => {
                        return Err(invalid(
                            "stop_price",
                            "must be at or below the limit price for STOP_LIMIT sells",
                            stop,
                        ));
                    }
                    _ => {}
                }
                Some(limit)
            }
        };

        // 3. TIF/expiry coherence
        match (request.time_in_force, request.expiry_date) {
            (TimeInForce::Gtd, None) => {
                return Err(invalid(
                    "expiry_date",
                    "required for GTD orders",
                    "<missing>",
                ));
            }
            (TimeInForce::Gtd, Some(expiry)) => {
                if expiry <= ist_date(now) {
                    return Err(invalid(
                        "expiry_date",
                        "must be strictly in the future",
                        expiry,
                    ));
                }
            }
            (_, Some(expiry)) => {
                return Err(invalid(
                    "expiry_date",
                    "only allowed for GTD orders",
                    expiry,
                ));
            }
            (_, None) => {}
        }

        // 4. Notional cap
        if let Some(price) = effective_price {
            let notional = price.notional(quantity);
            if notional > self.max_notional_ticks {
                return Err(invalid(
                    "quantity",
                    "order notional exceeds the maximum allowed",
                    format!("{}", Px::from_i64(notional)),
                ));
            }
        }

        Ok(ValidatedRequest {
            symbol,
            exchange: request.exchange,
            side: request.side,
            order_type: request.order_type,
            quantity,
            limit_price: request.limit_price,
            stop_price: request.stop_price,
            time_in_force: request.time_in_force,
            expiry_date: request.expiry_date,
            effective_price,
        })
    }
}

fn check_price_bounds(field: &str, price: Px) -> TradeResult<()> {
    let ticks = price.as_i64();
    if ticks <= MIN_PRICE_TICKS || ticks > MAX_PRICE_TICKS {
        return Err(invalid(
            field,
            "must be greater than 0.01 and at most 100000.00",
            price,
        ));
    }
    Ok(())
}
