//! Simulated execution against local book snapshots.
//!
//! Dry-run fills walk the same VWAP depth as the detectors, then apply
//! a configurable slippage haircut (always against the trader) and the
//! venue fee rate. Basket execution is all-or-nothing: if any leg lacks
//! depth, no leg fills.

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::core::domain::{Fill, OrderBook, OrderRequest, Side, Signal};
use crate::core::strategy::walk_notional;
use crate::core::telemetry::now_ms;
use crate::error::ExecutionError;

/// Simulated executor tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatedExecutorConfig {
    /// Slippage applied to every fill, in basis points.
    #[serde(default = "default_slippage_bps")]
    pub slippage_bps: u32,
    /// Venue fee rate applied to notional.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
}

fn default_slippage_bps() -> u32 {
    5
}

fn default_fee_rate() -> Decimal {
    Decimal::new(35, 4) // 0.35%
}

impl Default for SimulatedExecutorConfig {
    fn default() -> Self {
        Self {
            slippage_bps: default_slippage_bps(),
            fee_rate: default_fee_rate(),
        }
    }
}

/// Executes fills against provided book snapshots.
#[derive(Debug, Clone, Default)]
pub struct SimulatedExecutor {
    config: SimulatedExecutorConfig,
}

impl SimulatedExecutor {
    /// Create an executor with the given tuning.
    #[must_use]
    pub const fn new(config: SimulatedExecutorConfig) -> Self {
        Self { config }
    }

    /// Configured tuning.
    #[must_use]
    pub const fn config(&self) -> &SimulatedExecutorConfig {
        &self.config
    }

    /// Execute one order against a book snapshot.
    pub fn execute_order(
        &self,
        order: &OrderRequest,
        book: &OrderBook,
    ) -> Result<Fill, ExecutionError> {
        match order.side {
            Side::Buy => self.execute_buy(order, book),
            Side::Sell => self.execute_sell(order, book),
        }
    }

    /// Execute every leg of a signal against its book snapshot.
    ///
    /// Books must be supplied in leg order. No partial fills: the first
    /// leg without depth fails the whole basket.
    pub fn execute_signal(
        &self,
        signal: &Signal,
        books: &[OrderBook],
    ) -> Result<Vec<Fill>, ExecutionError> {
        let trace_id = signal.header().trace_id();
        let timestamp_ms = now_ms();
        let mut fills = Vec::with_capacity(signal.legs().len());

        for (index, leg) in signal.legs().iter().enumerate() {
            let book = books
                .iter()
                .find(|b| b.token_id() == &leg.token_id)
                .ok_or_else(|| ExecutionError::MissingBook(leg.token_id.to_string()))?;

            let order = OrderRequest {
                request_id: format!("sim-{}-{}", &trace_id[..trace_id.len().min(8)], index),
                trace_id: trace_id.to_string(),
                token_id: leg.token_id.clone(),
                side: leg.side,
                notional: leg.notional,
                timestamp_ms,
            };
            fills.push(self.execute_order(&order, book)?);
        }

        Ok(fills)
    }

    fn execute_buy(&self, order: &OrderRequest, book: &OrderBook) -> Result<Fill, ExecutionError> {
        let walk = walk_notional(book.asks(), order.notional);
        if !walk.filled {
            debug!(token_id = %order.token_id, "Insufficient ask depth for simulated buy");
            return Err(ExecutionError::InsufficientDepth(order.token_id.to_string()));
        }

        let fees = walk.cost * self.config.fee_rate;
        // Worse for the buyer: price shifted up by the slippage haircut.
        let slip = Decimal::ONE + Decimal::from(self.config.slippage_bps) / Decimal::from(10_000);
        let price = walk.avg_price * slip;

        Ok(self.fill(order, price, walk.shares, fees))
    }

    fn execute_sell(&self, order: &OrderRequest, book: &OrderBook) -> Result<Fill, ExecutionError> {
        let Some(best_bid) = book.best_bid() else {
            debug!(token_id = %order.token_id, "No bids for simulated sell");
            return Err(ExecutionError::InsufficientDepth(order.token_id.to_string()));
        };

        // Worse for the seller: price shifted down by the haircut.
        let slip = Decimal::ONE - Decimal::from(self.config.slippage_bps) / Decimal::from(10_000);
        let price = best_bid.price() * slip;
        let shares = order.notional / price;
        let fees = order.notional * self.config.fee_rate;

        Ok(self.fill(order, price, shares, fees))
    }

    fn fill(&self, order: &OrderRequest, price: Decimal, shares: Decimal, fees: Decimal) -> Fill {
        Fill::simulated(
            format!("sim_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
            order.request_id.clone(),
            order.trace_id.clone(),
            order.token_id.clone(),
            order.side,
            price,
            shares,
            fees,
            now_ms(),
            self.config.slippage_bps,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{MarketId, PriceLevel, SignalHeader, SignalLeg, TokenId};
    use rust_decimal_macros::dec;

    fn ask_book(token: &str, levels: &[(Decimal, Decimal)]) -> OrderBook {
        OrderBook::with_levels(
            TokenId::from(token),
            vec![],
            levels.iter().map(|(p, s)| PriceLevel::new(*p, *s)).collect(),
        )
    }

    fn buy(token: &str, notional: Decimal) -> OrderRequest {
        OrderRequest {
            request_id: "r1".into(),
            trace_id: "trace-1".into(),
            token_id: TokenId::from(token),
            side: Side::Buy,
            notional,
            timestamp_ms: 0,
        }
    }

    fn no_slippage() -> SimulatedExecutor {
        SimulatedExecutor::new(SimulatedExecutorConfig {
            slippage_bps: 0,
            fee_rate: dec!(0.0035),
        })
    }

    #[test]
    fn buy_fills_at_vwap_plus_slippage() {
        let executor = SimulatedExecutor::new(SimulatedExecutorConfig {
            slippage_bps: 10,
            fee_rate: dec!(0),
        });
        let book = ask_book("tok", &[(dec!(0.50), dec!(100))]);

        let fill = executor.execute_order(&buy("tok", dec!(10)), &book).unwrap();

        assert_eq!(fill.price, dec!(0.50) * dec!(1.001));
        assert_eq!(fill.shares, dec!(20));
        assert!(fill.simulated);
        assert_eq!(fill.slippage_bps, Some(10));
        assert!(fill.tx_hash.is_none());
    }

    #[test]
    fn buy_fees_apply_to_consumed_notional() {
        let executor = no_slippage();
        let book = ask_book("tok", &[(dec!(0.50), dec!(100))]);

        let fill = executor.execute_order(&buy("tok", dec!(10)), &book).unwrap();
        assert_eq!(fill.fees, dec!(10) * dec!(0.0035));
    }

    #[test]
    fn buy_without_depth_fails() {
        let executor = no_slippage();
        let book = ask_book("tok", &[(dec!(0.50), dec!(2))]);

        let result = executor.execute_order(&buy("tok", dec!(10)), &book);
        assert!(matches!(result, Err(ExecutionError::InsufficientDepth(_))));
    }

    #[test]
    fn sell_fills_at_best_bid_minus_slippage() {
        let executor = SimulatedExecutor::new(SimulatedExecutorConfig {
            slippage_bps: 10,
            fee_rate: dec!(0),
        });
        let book = OrderBook::with_levels(
            TokenId::from("tok"),
            vec![PriceLevel::new(dec!(0.60), dec!(100))],
            vec![],
        );
        let order = OrderRequest {
            side: Side::Sell,
            ..buy("tok", dec!(6))
        };

        let fill = executor.execute_order(&order, &book).unwrap();
        assert_eq!(fill.price, dec!(0.60) * dec!(0.999));
    }

    #[test]
    fn sell_without_bids_fails() {
        let executor = no_slippage();
        let book = ask_book("tok", &[(dec!(0.50), dec!(100))]);
        let order = OrderRequest {
            side: Side::Sell,
            ..buy("tok", dec!(6))
        };

        assert!(matches!(
            executor.execute_order(&order, &book),
            Err(ExecutionError::InsufficientDepth(_))
        ));
    }

    fn pair_signal() -> Signal {
        Signal::Atomic {
            header: SignalHeader::new("atomic", "trace-12345678", dec!(10), dec!(0.20), 1.0),
            market_id: MarketId::from("m1"),
            legs: vec![
                SignalLeg::buy(TokenId::from("yes"), dec!(4.8), dec!(0.48)),
                SignalLeg::buy(TokenId::from("no"), dec!(5.0), dec!(0.50)),
            ],
        }
    }

    #[test]
    fn signal_execution_fills_both_legs() {
        let executor = no_slippage();
        let books = vec![
            ask_book("yes", &[(dec!(0.48), dec!(100))]),
            ask_book("no", &[(dec!(0.50), dec!(100))]),
        ];

        let fills = executor.execute_signal(&pair_signal(), &books).unwrap();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].token_id.as_str(), "yes");
        assert_eq!(fills[1].token_id.as_str(), "no");
        assert!(fills.iter().all(|f| f.simulated));
    }

    #[test]
    fn signal_execution_is_all_or_nothing() {
        let executor = no_slippage();
        // NO side has no book at all.
        let books = vec![ask_book("yes", &[(dec!(0.48), dec!(100))])];

        let result = executor.execute_signal(&pair_signal(), &books);
        assert!(matches!(result, Err(ExecutionError::MissingBook(_))));
    }

    #[test]
    fn signal_execution_fails_on_thin_leg() {
        let executor = no_slippage();
        let books = vec![
            ask_book("yes", &[(dec!(0.48), dec!(100))]),
            ask_book("no", &[(dec!(0.50), dec!(1))]),
        ];

        let result = executor.execute_signal(&pair_signal(), &books);
        assert!(matches!(result, Err(ExecutionError::InsufficientDepth(_))));
    }
}
