//! Multi-outcome arbitrage detector for mutually exclusive markets.
//!
//! For N mutually exclusive outcomes, exactly one settles at one unit
//! of the numeraire. Acquiring one share of every outcome therefore
//! pays out exactly 1 per basket unit; when the combined depth-walked
//! cost of the basket is below that, the group carries a gross edge.

use rust_decimal::Decimal;
use tracing::debug;

use super::vwap::walk_shares;
use crate::core::domain::{MarketId, OrderBook, Signal, SignalHeader, SignalLeg, Volume};

/// Detector for N-outcome price-sum arbitrage.
#[derive(Debug, Clone)]
pub struct MultiOutcomeArbitrage {
    /// Basket units to acquire (shares per outcome).
    units: Volume,
}

impl MultiOutcomeArbitrage {
    /// Strategy name used in signals and telemetry.
    pub const NAME: &'static str = "multi_outcome";

    /// Create a detector acquiring `units` shares of every outcome.
    #[must_use]
    pub const fn new(units: Volume) -> Self {
        Self { units }
    }

    /// Configured basket units.
    #[must_use]
    pub const fn units(&self) -> Volume {
        self.units
    }

    /// Check an N-outcome book group for a positive gross edge.
    ///
    /// Books must be passed in outcome order; any side without enough
    /// depth for the basket rejects the whole group.
    #[must_use]
    pub fn detect(&self, market_id: &MarketId, books: &[OrderBook], trace_id: &str) -> Option<Signal> {
        if books.len() < 2 {
            return None;
        }

        let mut total_cost = Decimal::ZERO;
        let mut legs = Vec::with_capacity(books.len());

        for book in books {
            let walk = walk_shares(book.asks(), self.units);
            if !walk.filled {
                debug!(
                    market_id = %market_id,
                    token_id = %book.token_id(),
                    "Insufficient depth for basket leg"
                );
                return None;
            }
            total_cost += walk.cost;
            legs.push(SignalLeg::buy(
                book.token_id().clone(),
                walk.cost,
                walk.avg_price,
            ));
        }

        // Exactly one outcome pays out per basket unit.
        let payout = self.units;
        let gross = payout - total_cost;

        if gross <= Decimal::ZERO {
            return None;
        }

        debug!(
            market_id = %market_id,
            outcomes = books.len(),
            total_cost = %total_cost,
            gross = %gross,
            "Multi-outcome opportunity"
        );

        Some(Signal::MultiOutcome {
            header: SignalHeader::new(Self::NAME, trace_id, total_cost, gross, 1.0),
            market_id: market_id.clone(),
            legs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::strategy::atomic::book_of;
    use rust_decimal_macros::dec;

    #[test]
    fn discounted_basket_emits_signal() {
        let detector = MultiOutcomeArbitrage::new(dec!(1));
        let books = vec![
            book_of("a", &[(dec!(0.40), dec!(50))]),
            book_of("b", &[(dec!(0.25), dec!(50))]),
            book_of("c", &[(dec!(0.15), dec!(50))]),
            book_of("d", &[(dec!(0.10), dec!(50))]),
        ];

        let signal = detector
            .detect(&MarketId::from("m1"), &books, "trace-1")
            .expect("signal");

        // Basket cost 0.90, payout 1.00, gross 0.10.
        assert_eq!(signal.header().expected_profit(), dec!(0.10));
        assert_eq!(signal.legs().len(), 4);
        assert_eq!(signal.total_cost(), dec!(0.90));
    }

    #[test]
    fn fully_priced_basket_is_silent() {
        let detector = MultiOutcomeArbitrage::new(dec!(1));
        let books = vec![
            book_of("a", &[(dec!(0.60), dec!(50))]),
            book_of("b", &[(dec!(0.40), dec!(50))]),
        ];

        assert!(detector
            .detect(&MarketId::from("m1"), &books, "trace-1")
            .is_none());
    }

    #[test]
    fn missing_depth_rejects_group() {
        let detector = MultiOutcomeArbitrage::new(dec!(10));
        let books = vec![
            book_of("a", &[(dec!(0.40), dec!(50))]),
            // Only 2 shares available for a 10 unit basket.
            book_of("b", &[(dec!(0.25), dec!(2))]),
        ];

        assert!(detector
            .detect(&MarketId::from("m1"), &books, "trace-1")
            .is_none());
    }

    #[test]
    fn fewer_than_two_outcomes_is_silent() {
        let detector = MultiOutcomeArbitrage::new(dec!(1));
        let books = vec![book_of("a", &[(dec!(0.40), dec!(50))])];

        assert!(detector
            .detect(&MarketId::from("m1"), &books, "trace-1")
            .is_none());
    }

    #[test]
    fn multiple_units_scale_cost_and_edge() {
        let detector = MultiOutcomeArbitrage::new(dec!(5));
        let books = vec![
            book_of("a", &[(dec!(0.40), dec!(50))]),
            book_of("b", &[(dec!(0.50), dec!(50))]),
        ];

        let signal = detector
            .detect(&MarketId::from("m1"), &books, "trace-1")
            .expect("signal");

        // 5 baskets at 0.90 cost, 5.00 payout, gross 0.50.
        assert_eq!(signal.total_cost(), dec!(4.50));
        assert_eq!(signal.header().expected_profit(), dec!(0.50));
    }
}
