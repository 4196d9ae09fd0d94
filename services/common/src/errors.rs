//! Closed error taxonomy for the order lifecycle core
//!
//! Every public operation returns `Result<_, TradeError>`; no other error
//! type crosses an API boundary. Each variant carries a machine-readable
//! code and maps to a fixed HTTP status for the edge layer.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure classes reported by broker connectors
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BrokerError {
    /// Call exceeded its deadline
    #[error("broker call timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that elapsed, milliseconds
        timeout_ms: u64,
    },

    /// Broker actively refused the request
    #[error("broker rejected request: {reason}")]
    Rejected {
        /// Broker-supplied rejection reason
        reason: String,
    },

    /// Response could not be interpreted
    #[error("malformed broker response: {detail}")]
    Malformed {
        /// What failed to parse
        detail: String,
    },

    /// Anything else
    #[error("broker failure: {detail}")]
    Unknown {
        /// Connector-supplied detail
        detail: String,
    },
}

impl BrokerError {
    /// Timeout and Rejected count against the circuit breaker; transport
    /// noise (Malformed/Unknown) does not trip it on its own.
    #[must_use]
    pub const fn counts_against_breaker(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Rejected { .. })
    }
}

/// The closed error set surfaced by the lifecycle engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    /// Request failed a validation rule; never retried by callers
    #[error("validation failed on '{field}': {constraint}")]
    Validation {
        /// Offending request field
        field: String,
        /// Constraint that was violated
        constraint: String,
        /// The value that was rejected, rendered as text
        rejected_value: String,
    },

    /// Pre-trade risk gate declined the order
    #[error("risk check declined: {reason}")]
    Risk {
        /// Gate-supplied reason
        reason: String,
        /// Risk level tag attached by the gate
        risk_level: String,
    },

    /// Business-rule rejection (non-modifiable state, caps)
    #[error("order {order_id} rejected: {reason}")]
    OrderRejected {
        /// External order id
        order_id: String,
        /// Rejection reason
        reason: String,
    },

    /// Optimistic-concurrency clash; the caller may retry
    #[error("concurrent update detected on order {order_id}")]
    Conflict {
        /// External order id
        order_id: String,
    },

    /// External broker failure
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Circuit breaker is open for the broker
    #[error("broker {broker} unavailable, circuit open")]
    ServiceUnavailable {
        /// Broker whose breaker is open
        broker: String,
    },

    /// Persistence failure; fatal for the current operation
    #[error("storage failure: {detail}")]
    Storage {
        /// Backend-supplied detail
        detail: String,
    },

    /// Lookup miss
    #[error("order not found: {order_id}")]
    NotFound {
        /// External order id
        order_id: String,
    },

    /// Unclassified internal failure
    #[error("internal error: {detail}")]
    Internal {
        /// Diagnostic detail, logged with the correlation id
        detail: String,
    },
}

impl TradeError {
    /// Machine-readable error code for the wire format
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_FAILED",
            Self::Risk { .. } => "RISK_DECLINED",
            Self::OrderRejected { .. } => "ORDER_REJECTED",
            Self::Conflict { .. } => "CONCURRENT_MODIFICATION",
            Self::Broker(_) => "BROKER_ERROR",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Storage { .. } => "STORAGE_FAILURE",
            Self::NotFound { .. } => "ORDER_NOT_FOUND",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Fixed HTTP status mapping used by the edge layer
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Risk { .. } => 403,
            Self::OrderRejected { .. } | Self::Conflict { .. } => 409,
            Self::NotFound { .. } => 404,
            Self::ServiceUnavailable { .. } => 503,
            Self::Broker(_) => 502,
            Self::Storage { .. } | Self::Internal { .. } => 500,
        }
    }
}

/// Convenience alias used across the services
pub type TradeResult<T> = Result<T, TradeError>;

/// One field-level validation failure in the wire format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFailure {
    /// Offending field
    pub field: String,
    /// Human-readable message
    pub message: String,
    /// Rejected value rendered as text
    pub rejected_value: String,
}

/// Standardized error payload returned to API clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub error_code: String,
    /// Human-readable message
    pub message: String,
    /// Optional diagnostic detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Field-level failures, present for validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<ValidationFailure>>,
    /// Request path
    pub path: String,
    /// HTTP status
    pub status: u16,
    /// ISO-8601 timestamp with millisecond precision, UTC
    pub timestamp: String,
    /// Correlation id of the failed request
    pub correlation_id: String,
}

impl ErrorResponse {
    /// Build the wire payload for a failed request
    #[must_use]
    pub fn from_error(
        error: &TradeError,
        path: &str,
        correlation_id: &str,
        at: DateTime<Utc>,
    ) -> Self {
        let validation_errors = match error {
            TradeError::Validation {
                field,
                constraint,
                rejected_value,
            } => Some(vec![ValidationFailure {
                field: field.clone(),
                message: constraint.clone(),
                rejected_value: rejected_value.clone(),
            }]),
            _ => None,
        };

        Self {
            error_code: error.code().to_string(),
            message: error.to_string(),
            details: None,
            validation_errors,
            path: path.to_string(),
            status: error.status(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            correlation_id: correlation_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_mapping_is_fixed() {
        let validation = TradeError::Validation {
            field: "quantity".into(),
            constraint: "must be positive".into(),
            rejected_value: "0".into(),
        };
        assert_eq!(validation.status(), 400);
        assert_eq!(validation.code(), "VALIDATION_FAILED");

        assert_eq!(
            TradeError::Risk {
                reason: "exposure".into(),
                risk_level: "HIGH".into()
            }
            .status(),
            403
        );
        assert_eq!(
            TradeError::NotFound {
                order_id: "ORD-1".into()
            }
            .status(),
            404
        );
        assert_eq!(
            TradeError::ServiceUnavailable {
                broker: "ZERODHA".into()
            }
            .status(),
            503
        );
        assert_eq!(
            TradeError::Storage {
                detail: "pool closed".into()
            }
            .status(),
            500
        );
    }

    #[test]
    fn breaker_accounting_by_class() {
        assert!(BrokerError::Timeout { timeout_ms: 2000 }.counts_against_breaker());
        assert!(
            BrokerError::Rejected {
                reason: "margin".into()
            }
            .counts_against_breaker()
        );
        assert!(
            !BrokerError::Malformed {
                detail: "bad json".into()
            }
            .counts_against_breaker()
        );
    }

    #[test]
    fn wire_format_timestamp_is_millis_zulu() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap();
        let err = TradeError::NotFound {
            order_id: "ORD-404".into(),
        };
        let payload = ErrorResponse::from_error(&err, "/api/v1/orders/ORD-404", "corr-1", at);
        assert_eq!(payload.timestamp, "2025-03-14T09:26:53.000Z");
        assert_eq!(payload.status, 404);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["errorCode"], "ORDER_NOT_FOUND");
        assert_eq!(json["correlationId"], "corr-1");
        assert!(json.get("validationErrors").is_none());
    }
}
