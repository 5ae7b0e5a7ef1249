//! Order requests and the unified fill model.
//!
//! Simulated (dry-run) and live fills share one [`Fill`] shape so the
//! PnL tracker and telemetry stay monomorphic over execution mode. The
//! mode-specific fields are mutually exclusive: `slippage_bps` is only
//! populated on simulated fills, `tx_hash` only on live ones.

use serde::Serialize;

use super::id::TokenId;
use super::money::{Notional, Price, Volume};

/// Side of an order or fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// One leg submitted for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub request_id: String,
    pub trace_id: String,
    pub token_id: TokenId,
    pub side: Side,
    /// Target notional in the numeraire.
    pub notional: Notional,
    pub timestamp_ms: i64,
}

/// A confirmed execution of one leg.
#[derive(Debug, Clone, Serialize)]
pub struct Fill {
    pub fill_id: String,
    pub order_request_id: String,
    pub trace_id: String,
    pub token_id: TokenId,
    pub side: Side,
    pub price: Price,
    pub shares: Volume,
    pub fees: Notional,
    pub timestamp_ms: i64,
    pub simulated: bool,
    /// Slippage applied, simulated fills only.
    pub slippage_bps: Option<u32>,
    /// Transaction hash, live fills only.
    pub tx_hash: Option<String>,
    /// Whether the fill's transaction is confirmed on-chain.
    pub on_chain_confirmed: bool,
}

impl Fill {
    /// Build a simulated fill.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn simulated(
        fill_id: impl Into<String>,
        order_request_id: impl Into<String>,
        trace_id: impl Into<String>,
        token_id: TokenId,
        side: Side,
        price: Price,
        shares: Volume,
        fees: Notional,
        timestamp_ms: i64,
        slippage_bps: u32,
    ) -> Self {
        Self {
            fill_id: fill_id.into(),
            order_request_id: order_request_id.into(),
            trace_id: trace_id.into(),
            token_id,
            side,
            price,
            shares,
            fees,
            timestamp_ms,
            simulated: true,
            slippage_bps: Some(slippage_bps),
            tx_hash: None,
            on_chain_confirmed: false,
        }
    }

    /// Build a live fill backed by an on-chain transaction.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn live(
        fill_id: impl Into<String>,
        order_request_id: impl Into<String>,
        trace_id: impl Into<String>,
        token_id: TokenId,
        side: Side,
        price: Price,
        shares: Volume,
        fees: Notional,
        timestamp_ms: i64,
        tx_hash: impl Into<String>,
        on_chain_confirmed: bool,
    ) -> Self {
        Self {
            fill_id: fill_id.into(),
            order_request_id: order_request_id.into(),
            trace_id: trace_id.into(),
            token_id,
            side,
            price,
            shares,
            fees,
            timestamp_ms,
            simulated: false,
            slippage_bps: None,
            tx_hash: Some(tx_hash.into()),
            on_chain_confirmed,
        }
    }

    /// Notional value of the fill (price * shares).
    #[must_use]
    pub fn notional(&self) -> Notional {
        self.price * self.shares
    }

    /// Net proceeds after fees: negative for buys (cost), positive for
    /// sells.
    #[must_use]
    pub fn net_proceeds(&self) -> Notional {
        match self.side {
            Side::Buy => -self.notional() - self.fees,
            Side::Sell => self.notional() - self.fees,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy_fill() -> Fill {
        Fill::simulated(
            "f1",
            "r1",
            "t1",
            TokenId::from("yes"),
            Side::Buy,
            dec!(0.48),
            dec!(10),
            dec!(0.02),
            1_000,
            5,
        )
    }

    #[test]
    fn notional_is_price_times_shares() {
        assert_eq!(buy_fill().notional(), dec!(4.80));
    }

    #[test]
    fn buy_net_proceeds_are_negative() {
        assert_eq!(buy_fill().net_proceeds(), dec!(-4.82));
    }

    #[test]
    fn sell_net_proceeds_are_positive() {
        let fill = Fill::live(
            "f2",
            "r2",
            "t2",
            TokenId::from("no"),
            Side::Sell,
            dec!(0.50),
            dec!(10),
            dec!(0.02),
            1_000,
            "0xabc",
            true,
        );
        assert_eq!(fill.net_proceeds(), dec!(4.98));
    }

    #[test]
    fn mode_fields_are_mutually_exclusive() {
        let sim = buy_fill();
        assert!(sim.simulated);
        assert!(sim.slippage_bps.is_some());
        assert!(sim.tx_hash.is_none());

        let live = Fill::live(
            "f",
            "r",
            "t",
            TokenId::from("x"),
            Side::Buy,
            dec!(0.5),
            dec!(1),
            dec!(0),
            0,
            "0xdead",
            false,
        );
        assert!(!live.simulated);
        assert!(live.slippage_bps.is_none());
        assert!(live.tx_hash.is_some());
    }
}
