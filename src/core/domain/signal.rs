//! Candidate trading signals.
//!
//! Strategies emit one sum-typed [`Signal`] shape so the risk gate and
//! execution router stay monomorphic over strategy kind. The header
//! carries the fields every strategy shares; legs carry the per-token
//! buy plan.

use super::fill::Side;
use super::id::{MarketId, TokenId};
use super::money::{Notional, Price};

/// Fields common to every strategy's signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalHeader {
    strategy: String,
    trace_id: String,
    trade_size: Notional,
    expected_profit: Notional,
    confidence: ConfidenceScore,
}

impl SignalHeader {
    /// Create a new header. Confidence is clamped to `[0, 1]`.
    pub fn new(
        strategy: impl Into<String>,
        trace_id: impl Into<String>,
        trade_size: Notional,
        expected_profit: Notional,
        confidence: f64,
    ) -> Self {
        Self {
            strategy: strategy.into(),
            trace_id: trace_id.into(),
            trade_size,
            expected_profit,
            confidence: ConfidenceScore::new(confidence),
        }
    }

    /// Name of the strategy that produced the signal.
    #[must_use]
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// Trace ID of the detection cycle.
    #[must_use]
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Total notional committed by the signal.
    #[must_use]
    pub const fn trade_size(&self) -> Notional {
        self.trade_size
    }

    /// Expected gross profit at detection time.
    #[must_use]
    pub const fn expected_profit(&self) -> Notional {
        self.expected_profit
    }

    /// Confidence in the signal, in `[0, 1]`.
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.confidence.value()
    }
}

/// Confidence value guaranteed to lie in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ConfidenceScore(f64);

impl ConfidenceScore {
    fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    const fn value(self) -> f64 {
        self.0
    }
}

impl Eq for ConfidenceScore {}

/// One leg of an arbitrage basket: buy (or sell) a token for a target
/// notional at an estimated average price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalLeg {
    pub token_id: TokenId,
    pub side: Side,
    pub notional: Notional,
    pub price: Price,
}

impl SignalLeg {
    /// Create a buy leg, the common case for price-sum arbitrage.
    #[must_use]
    pub const fn buy(token_id: TokenId, notional: Notional, price: Price) -> Self {
        Self {
            token_id,
            side: Side::Buy,
            notional,
            price,
        }
    }
}

/// A candidate signal emitted by a detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Binary YES+NO arbitrage: two legs, cost per unit below payout.
    Atomic {
        header: SignalHeader,
        market_id: MarketId,
        legs: Vec<SignalLeg>,
    },
    /// N-outcome mutually exclusive arbitrage: one leg per outcome.
    MultiOutcome {
        header: SignalHeader,
        market_id: MarketId,
        legs: Vec<SignalLeg>,
    },
}

impl Signal {
    /// The shared header.
    #[must_use]
    pub const fn header(&self) -> &SignalHeader {
        match self {
            Self::Atomic { header, .. } | Self::MultiOutcome { header, .. } => header,
        }
    }

    /// The market this signal trades.
    #[must_use]
    pub const fn market_id(&self) -> &MarketId {
        match self {
            Self::Atomic { market_id, .. } | Self::MultiOutcome { market_id, .. } => market_id,
        }
    }

    /// The legs to execute, in order.
    #[must_use]
    pub fn legs(&self) -> &[SignalLeg] {
        match self {
            Self::Atomic { legs, .. } | Self::MultiOutcome { legs, .. } => legs,
        }
    }

    /// Stable kind tag, used in telemetry and idempotency keys.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Atomic { .. } => "atomic_arbitrage",
            Self::MultiOutcome { .. } => "multi_outcome_arbitrage",
        }
    }

    /// The first leg's token, used to key logically identical signals.
    #[must_use]
    pub fn primary_token(&self) -> &TokenId {
        &self.legs()[0].token_id
    }

    /// Sum of leg notionals.
    #[must_use]
    pub fn total_cost(&self) -> Notional {
        self.legs().iter().map(|l| l.notional).sum()
    }
}
