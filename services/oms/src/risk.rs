//! Pre-trade risk gate contract
//!
//! Scoring lives in the risk service; the engine only consumes an approval
//! or a `TradeError::Risk` decline carrying the reason and level.

use crate::order::ValidatedRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use services_common::TradeResult;
use std::fmt;

/// Risk level tag attached to approvals and declines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Routine order
    Low,
    /// Elevated but approved
    Medium,
    /// Approved with warnings, or the level of a decline
    High,
}

impl RiskLevel {
    /// Canonical level tag
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval returned by the gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskApproval {
    /// Assessed level
    pub risk_level: RiskLevel,
    /// Assessment notes, possibly empty
    pub reasons: Vec<String>,
}

/// Pre-trade check consumed before any order is persisted
#[async_trait]
pub trait RiskGate: Send + Sync {
    /// Assess one validated request for one user; a decline is returned as
    /// `TradeError::Risk`
    async fn assess(&self, request: &ValidatedRequest, user_id: i64) -> TradeResult<RiskApproval>;
}

/// Approves everything at low risk; default wiring when no risk service is
/// attached
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRiskGate;

#[async_trait]
impl RiskGate for OpenRiskGate {
    async fn assess(&self, _request: &ValidatedRequest, _user_id: i64) -> TradeResult<RiskApproval> {
        Ok(RiskApproval {
            risk_level: RiskLevel::Low,
            reasons: Vec::new(),
        })
    }
}
