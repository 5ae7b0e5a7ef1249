//! Risk manager: validates signals with full cost attribution.
//!
//! The gate evaluates its predicates in a fixed order and stops at the
//! first failure, so every rejection carries the code of exactly one
//! predicate. Acceptance at the exact threshold is an accept. All
//! decisions (both ways) are emitted to telemetry as edge breakdowns.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::domain::{
    EdgeBreakdown, EdgeCosts, Notional, RejectCode, RiskTag, Signal,
};
use crate::core::telemetry::{EventLog, EventType};

/// Risk limits enforced on every signal.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskLimits {
    /// Maximum notional per trade.
    #[serde(default = "default_max_position")]
    pub max_position: Decimal,
    /// Minimum net profit as a fraction of trade size.
    #[serde(default = "default_min_profit_pct")]
    pub min_profit_pct: Decimal,
    /// Maximum acceptable gas cost in the numeraire.
    #[serde(default = "default_max_gas_cost")]
    pub max_gas_cost: Decimal,
    /// Maximum acceptable slippage as a fraction of trade size.
    #[serde(default = "default_max_slippage_pct")]
    pub max_slippage_pct: Decimal,
    /// Fraction of gross profit reserved against execution latency.
    #[serde(default = "default_latency_buffer_factor")]
    pub latency_buffer_factor: Decimal,
}

fn default_max_position() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_min_profit_pct() -> Decimal {
    Decimal::new(1, 2) // 1%
}

fn default_max_gas_cost() -> Decimal {
    Decimal::ONE
}

fn default_max_slippage_pct() -> Decimal {
    Decimal::new(1, 2) // 1%
}

fn default_latency_buffer_factor() -> Decimal {
    Decimal::new(1, 3) // 0.1%
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position: default_max_position(),
            min_profit_pct: default_min_profit_pct(),
            max_gas_cost: default_max_gas_cost(),
            max_slippage_pct: default_max_slippage_pct(),
            latency_buffer_factor: default_latency_buffer_factor(),
        }
    }
}

/// Live inputs to one gating decision.
#[derive(Debug, Clone, Copy)]
pub struct RiskInputs {
    /// Free numeraire balance.
    pub balance: Notional,
    /// Estimated gas cost for the full basket.
    pub gas_cost: Notional,
    /// Estimated trading fees.
    pub fees: Notional,
    /// Estimated slippage cost.
    pub slippage: Notional,
}

/// Risk manager validating signals before execution.
pub struct RiskManager {
    limits: RiskLimits,
    event_log: Option<Arc<EventLog>>,
}

impl RiskManager {
    /// Create a manager with the given limits.
    #[must_use]
    pub const fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            event_log: None,
        }
    }

    /// Attach a telemetry sink; every breakdown is emitted to it.
    #[must_use]
    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Configured limits.
    #[must_use]
    pub const fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Gate a signal, producing an edge breakdown either way.
    #[must_use]
    pub fn gate(&self, signal: &Signal, inputs: RiskInputs) -> EdgeBreakdown {
        let gross = signal.header().expected_profit();
        let trade_size = signal.header().trade_size();
        let latency_buffer = gross * self.limits.latency_buffer_factor;
        let min_threshold = trade_size * self.limits.min_profit_pct;

        let costs = EdgeCosts {
            gross,
            fees: inputs.fees,
            slippage: inputs.slippage,
            gas: inputs.gas_cost,
            latency_buffer,
            min_threshold,
        };
        let net = crate::core::domain::net_edge(
            gross,
            inputs.fees,
            inputs.slippage,
            inputs.gas_cost,
            latency_buffer,
        );

        let breakdown = if inputs.balance < Decimal::ZERO
            || inputs.gas_cost < Decimal::ZERO
            || gross < Decimal::ZERO
        {
            EdgeBreakdown::reject(
                costs,
                RejectCode::NegativeValues,
                "Negative values detected in balance, gas cost, or profit",
                vec![],
            )
        } else if inputs.balance < trade_size {
            EdgeBreakdown::reject(
                costs,
                RejectCode::InsufficientBalance,
                format!("Insufficient balance: {} < {}", inputs.balance, trade_size),
                vec![],
            )
        } else if trade_size > self.limits.max_position {
            EdgeBreakdown::reject(
                costs,
                RejectCode::PositionLimit,
                format!(
                    "Position size exceeds limit: {} > {}",
                    trade_size, self.limits.max_position
                ),
                vec![],
            )
        } else if inputs.gas_cost > self.limits.max_gas_cost {
            EdgeBreakdown::reject(
                costs,
                RejectCode::GasTooHigh,
                format!(
                    "Gas cost too high: {} > {}",
                    inputs.gas_cost, self.limits.max_gas_cost
                ),
                vec![],
            )
        } else if gross <= inputs.gas_cost {
            EdgeBreakdown::reject(
                costs,
                RejectCode::ProfitBelowGas,
                format!("Profit does not cover gas: {} <= {}", gross, inputs.gas_cost),
                vec![],
            )
        } else if net < min_threshold {
            EdgeBreakdown::reject(
                costs,
                RejectCode::ProfitTooLow,
                format!("Profit below threshold: {net} < {min_threshold}"),
                vec![],
            )
        } else if inputs.slippage > trade_size * self.limits.max_slippage_pct {
            EdgeBreakdown::reject(
                costs,
                RejectCode::SlippageExceeded,
                format!(
                    "Slippage exceeds limit: {} > {}",
                    inputs.slippage,
                    trade_size * self.limits.max_slippage_pct
                ),
                vec![],
            )
        } else {
            EdgeBreakdown::accept(
                costs,
                format!("Acceptable profit: net_edge={net} >= threshold={min_threshold}"),
            )
        };

        self.record(signal, &breakdown);
        breakdown
    }

    /// Reject a signal on a strategy-specific flag raised outside the
    /// standard predicate chain (anomaly guard, resolution analysis).
    #[must_use]
    pub fn reject_flagged(
        &self,
        signal: &Signal,
        code: RejectCode,
        reason: impl Into<String>,
        risk_tags: Vec<RiskTag>,
    ) -> EdgeBreakdown {
        let gross = signal.header().expected_profit();
        let breakdown = EdgeBreakdown::reject(
            EdgeCosts {
                gross,
                fees: Decimal::ZERO,
                slippage: Decimal::ZERO,
                gas: Decimal::ZERO,
                latency_buffer: gross * self.limits.latency_buffer_factor,
                min_threshold: signal.header().trade_size() * self.limits.min_profit_pct,
            },
            code,
            reason,
            risk_tags,
        );
        self.record(signal, &breakdown);
        breakdown
    }

    fn record(&self, signal: &Signal, breakdown: &EdgeBreakdown) {
        if breakdown.is_accept() {
            info!(
                strategy = signal.header().strategy(),
                net = %breakdown.net,
                "Signal accepted"
            );
        } else {
            warn!(
                strategy = signal.header().strategy(),
                code = ?breakdown.reject_code,
                reason = %breakdown.reason,
                "Signal rejected"
            );
        }

        if let Some(log) = &self.event_log {
            let data = serde_json::json!({
                "strategy": signal.header().strategy(),
                "signal_type": signal.kind(),
                "market_id": signal.market_id().as_str(),
                "breakdown": breakdown,
            });
            log.emit(
                EventType::RiskDecision,
                data,
                Some(signal.header().trace_id()),
            );
        }
    }
}
