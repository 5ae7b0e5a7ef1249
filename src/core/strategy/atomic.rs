//! Atomic arbitrage detector for binary YES/NO pairs.
//!
//! Buying one unit each of YES and NO settles to exactly one unit of
//! the numeraire; whenever the combined VWAP cost of both sides is
//! below that, the pair carries a riskless gross edge.

use rust_decimal::Decimal;
use tracing::debug;

use super::vwap::walk_notional;
use crate::core::domain::{MarketId, Notional, OrderBook, Signal, SignalHeader, SignalLeg};

/// Detector for binary YES/NO price-sum arbitrage.
#[derive(Debug, Clone)]
pub struct AtomicArbitrage {
    trade_size: Notional,
}

impl AtomicArbitrage {
    /// Strategy name used in signals and telemetry.
    pub const NAME: &'static str = "atomic";

    /// Create a detector committing `trade_size` notional per leg.
    #[must_use]
    pub const fn new(trade_size: Notional) -> Self {
        Self { trade_size }
    }

    /// Configured per-leg notional.
    #[must_use]
    pub const fn trade_size(&self) -> Notional {
        self.trade_size
    }

    /// Check a YES/NO book pair for a positive gross edge.
    ///
    /// Fees, gas, and slippage are deliberately not applied here; the
    /// risk gate attributes those costs and makes the final call.
    #[must_use]
    pub fn detect(
        &self,
        market_id: &MarketId,
        yes_book: &OrderBook,
        no_book: &OrderBook,
        trace_id: &str,
    ) -> Option<Signal> {
        let yes = walk_notional(yes_book.asks(), self.trade_size);
        let no = walk_notional(no_book.asks(), self.trade_size);

        if !yes.filled || !no.filled {
            debug!(
                market_id = %market_id,
                yes_filled = yes.filled,
                no_filled = no.filled,
                "Insufficient depth for atomic pair"
            );
            return None;
        }

        let cost_per_unit = yes.avg_price + no.avg_price;
        let gross_per_unit = Decimal::ONE - cost_per_unit;
        let gross_total = gross_per_unit * self.trade_size;

        if gross_total <= Decimal::ZERO {
            return None;
        }

        debug!(
            market_id = %market_id,
            cost_per_unit = %cost_per_unit,
            gross_total = %gross_total,
            "Atomic opportunity"
        );

        Some(Signal::Atomic {
            header: SignalHeader::new(
                Self::NAME,
                trace_id,
                self.trade_size,
                gross_total,
                // Price-sum arbitrage on an exhaustive pair carries no
                // model risk.
                1.0,
            ),
            market_id: market_id.clone(),
            legs: vec![
                SignalLeg::buy(
                    yes_book.token_id().clone(),
                    yes.avg_price * self.trade_size,
                    yes.avg_price,
                ),
                SignalLeg::buy(
                    no_book.token_id().clone(),
                    no.avg_price * self.trade_size,
                    no.avg_price,
                ),
            ],
        })
    }
}

/// Build a book with only an ask side, for detector tests.
#[cfg(test)]
pub(crate) fn book_of(token: &str, asks: &[(Decimal, Decimal)]) -> OrderBook {
    use crate::core::domain::{PriceLevel, TokenId};
    OrderBook::with_levels(
        TokenId::from(token),
        vec![],
        asks.iter().map(|(p, s)| PriceLevel::new(*p, *s)).collect(),
    )
}
