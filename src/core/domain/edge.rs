//! Edge breakdown with cost attribution and decision coding.
//!
//! Risk rejections are in-band values, never errors: every gated signal
//! produces exactly one [`EdgeBreakdown`], ACCEPT or REJECT, and the
//! breakdown always satisfies `net = gross - fees - slippage - gas -
//! latency_buffer`.

use rust_decimal::Decimal;
use serde::Serialize;

/// Trading decision for a gated signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Accept,
    Reject,
}

/// Standardized reject codes, evaluated in the gate's fixed order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectCode {
    NegativeValues,
    InsufficientBalance,
    PositionLimit,
    GasTooHigh,
    ProfitBelowGas,
    ProfitTooLow,
    SlippageExceeded,

    // Strategy-specific rejects raised by the anomaly guard and
    // longer-horizon strategies.
    ResolutionUncertain,
    DisputeRiskHigh,
    CarryCostTooHigh,
    ManipulationRisk,
    AbnormalVolatility,
}

/// Risk tags attached to a breakdown for downstream risk tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTag {
    TailRisk,
    SettlementRisk,
    ManipulationRisk,
    DisputeRisk,
    LowLiquidity,
    CarryCostRisk,
}

/// Net profit after all cost deductions.
#[must_use]
pub fn net_edge(
    gross: Decimal,
    fees: Decimal,
    slippage: Decimal,
    gas: Decimal,
    latency_buffer: Decimal,
) -> Decimal {
    gross - fees - slippage - gas - latency_buffer
}

/// Cost attribution for one gated signal.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeBreakdown {
    pub gross: Decimal,
    pub fees: Decimal,
    pub slippage: Decimal,
    pub gas: Decimal,
    pub latency_buffer: Decimal,
    pub min_threshold: Decimal,
    pub net: Decimal,
    pub decision: Decision,
    pub reject_code: Option<RejectCode>,
    pub reason: String,
    pub risk_tags: Vec<RiskTag>,
}

/// Cost inputs shared by the accept and reject constructors.
#[derive(Debug, Clone, Copy)]
pub struct EdgeCosts {
    pub gross: Decimal,
    pub fees: Decimal,
    pub slippage: Decimal,
    pub gas: Decimal,
    pub latency_buffer: Decimal,
    pub min_threshold: Decimal,
}

impl EdgeBreakdown {
    /// Build an ACCEPT breakdown. `net` is derived, never supplied.
    #[must_use]
    pub fn accept(costs: EdgeCosts, reason: impl Into<String>) -> Self {
        Self::build(costs, Decision::Accept, None, reason, Vec::new())
    }

    /// Build a REJECT breakdown with its coded reason.
    #[must_use]
    pub fn reject(
        costs: EdgeCosts,
        code: RejectCode,
        reason: impl Into<String>,
        risk_tags: Vec<RiskTag>,
    ) -> Self {
        Self::build(costs, Decision::Reject, Some(code), reason, risk_tags)
    }

    fn build(
        costs: EdgeCosts,
        decision: Decision,
        reject_code: Option<RejectCode>,
        reason: impl Into<String>,
        risk_tags: Vec<RiskTag>,
    ) -> Self {
        Self {
            gross: costs.gross,
            fees: costs.fees,
            slippage: costs.slippage,
            gas: costs.gas,
            latency_buffer: costs.latency_buffer,
            min_threshold: costs.min_threshold,
            net: net_edge(
                costs.gross,
                costs.fees,
                costs.slippage,
                costs.gas,
                costs.latency_buffer,
            ),
            decision,
            reject_code,
            reason: reason.into(),
            risk_tags,
        }
    }

    /// Whether the gate accepted the signal.
    #[must_use]
    pub fn is_accept(&self) -> bool {
        self.decision == Decision::Accept
    }
}
