//! PnL tracking for simulated and live trades.
//!
//! The ledger only moves on fills, never on order submission.
//! Simulated and realized PnL are strictly separated: a dry-run fill
//! can never touch realized PnL, and a live fill counts only once its
//! transaction is confirmed on-chain.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::domain::{Fill, Notional, Side, TokenId};
use crate::core::telemetry::{now_ms, EventLog, EventType};

/// One PnL ledger entry.
#[derive(Debug, Clone, Serialize)]
pub struct PnLUpdate {
    pub timestamp_ms: i64,
    pub trace_id: String,
    pub strategy: String,
    pub token_ids: Vec<String>,
    pub expected_edge: Decimal,
    pub simulated_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub fees_paid: Decimal,
    pub slippage_cost: Decimal,
    pub is_simulated: bool,
}

/// Cumulative ledger state.
#[derive(Debug, Clone, Serialize)]
pub struct PnLSummary {
    pub cumulative_expected_edge: Decimal,
    pub cumulative_simulated_pnl: Decimal,
    pub cumulative_realized_pnl: Decimal,
    pub updates: usize,
    pub positions: Vec<(String, Decimal)>,
}

#[derive(Default)]
struct Inner {
    positions: HashMap<TokenId, Decimal>,
    cumulative_expected_edge: Decimal,
    cumulative_simulated_pnl: Decimal,
    cumulative_realized_pnl: Decimal,
    updates: usize,
}

/// Fill-driven PnL ledger.
pub struct PnLTracker {
    inner: Mutex<Inner>,
    event_log: Option<Arc<EventLog>>,
}

impl PnLTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            event_log: None,
        }
    }

    /// Attach a telemetry sink; updates are emitted to it.
    #[must_use]
    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Process the fills of one execution and update the ledger.
    ///
    /// For an arbitrage basket the settlement payout equals the total
    /// shares acquired (one numeraire unit per basket unit), so
    /// `pnl = payout + sum(net_proceeds) - slippage_cost`.
    pub fn process_fills(
        &self,
        fills: &[Fill],
        expected_edge: Notional,
        trace_id: &str,
        strategy: &str,
    ) -> PnLUpdate {
        if fills.is_empty() {
            return self.empty_update(expected_edge, trace_id, strategy);
        }

        let mut total_proceeds = Decimal::ZERO;
        let mut total_fees = Decimal::ZERO;
        let mut total_slippage = Decimal::ZERO;
        let mut total_shares = Decimal::ZERO;

        for fill in fills {
            total_proceeds += fill.net_proceeds();
            total_fees += fill.fees;
            total_shares += fill.shares;
            if let Some(bps) = fill.slippage_bps {
                total_slippage += fill.notional() * Decimal::from(bps) / Decimal::from(10_000);
            }
        }

        let pnl = if fills.len() >= 2 {
            // Complete basket: every acquired share pays out one unit.
            total_shares + total_proceeds - total_slippage
        } else {
            expected_edge - total_fees - total_slippage
        };

        let is_simulated = fills[0].simulated;
        let all_confirmed = fills.iter().all(|f| f.on_chain_confirmed);

        let mut inner = self.inner.lock();
        for fill in fills {
            let position = inner.positions.entry(fill.token_id.clone()).or_default();
            match fill.side {
                Side::Buy => *position += fill.shares,
                Side::Sell => *position -= fill.shares,
            }
        }
        inner.cumulative_expected_edge += expected_edge;
        if is_simulated {
            inner.cumulative_simulated_pnl += pnl;
        } else if all_confirmed {
            inner.cumulative_realized_pnl += pnl;
        }
        inner.updates += 1;
        drop(inner);

        let update = PnLUpdate {
            timestamp_ms: now_ms(),
            trace_id: trace_id.to_string(),
            strategy: strategy.to_string(),
            token_ids: fills.iter().map(|f| f.token_id.to_string()).collect(),
            expected_edge,
            simulated_pnl: if is_simulated { pnl } else { Decimal::ZERO },
            realized_pnl: if !is_simulated && all_confirmed {
                pnl
            } else {
                Decimal::ZERO
            },
            fees_paid: total_fees,
            slippage_cost: total_slippage,
            is_simulated,
        };

        self.emit(&update);
        update
    }

    /// Current position in a token.
    #[must_use]
    pub fn position(&self, token_id: &TokenId) -> Decimal {
        self.inner
            .lock()
            .positions
            .get(token_id)
            .copied()
            .unwrap_or_default()
    }

    /// Ledger summary.
    #[must_use]
    pub fn summary(&self) -> PnLSummary {
        let inner = self.inner.lock();
        let mut positions: Vec<(String, Decimal)> = inner
            .positions
            .iter()
            .map(|(token, qty)| (token.to_string(), *qty))
            .collect();
        positions.sort_by(|a, b| a.0.cmp(&b.0));
        PnLSummary {
            cumulative_expected_edge: inner.cumulative_expected_edge,
            cumulative_simulated_pnl: inner.cumulative_simulated_pnl,
            cumulative_realized_pnl: inner.cumulative_realized_pnl,
            updates: inner.updates,
            positions,
        }
    }

    fn empty_update(&self, expected_edge: Notional, trace_id: &str, strategy: &str) -> PnLUpdate {
        let update = PnLUpdate {
            timestamp_ms: now_ms(),
            trace_id: trace_id.to_string(),
            strategy: strategy.to_string(),
            token_ids: vec![],
            expected_edge,
            simulated_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            fees_paid: Decimal::ZERO,
            slippage_cost: Decimal::ZERO,
            is_simulated: false,
        };
        self.emit(&update);
        update
    }

    fn emit(&self, update: &PnLUpdate) {
        if let Some(log) = &self.event_log {
            log.emit(
                EventType::PnlUpdate,
                serde_json::to_value(update).unwrap_or_default(),
                Some(&update.trace_id),
            );
        }
    }
}

impl Default for PnLTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sim_fill(token: &str, price: Decimal, shares: Decimal, fees: Decimal) -> Fill {
        Fill::simulated(
            format!("f-{token}"),
            "r1",
            "trace-1",
            TokenId::from(token),
            Side::Buy,
            price,
            shares,
            fees,
            0,
            0,
        )
    }

    fn live_fill(token: &str, price: Decimal, shares: Decimal, confirmed: bool) -> Fill {
        Fill::live(
            format!("f-{token}"),
            "r1",
            "trace-1",
            TokenId::from(token),
            Side::Buy,
            price,
            shares,
            dec!(0),
            0,
            "0xabc",
            confirmed,
        )
    }

    #[test]
    fn basket_pnl_matches_parity_formula() {
        let tracker = PnLTracker::new();
        // Buy 10 YES at 0.48 (fees 0.05) and 10 NO at 0.50 (fees 0.05).
        let fills = vec![
            sim_fill("yes", dec!(0.48), dec!(10), dec!(0.05)),
            sim_fill("no", dec!(0.50), dec!(10), dec!(0.05)),
        ];

        let update = tracker.process_fills(&fills, dec!(0.20), "trace-1", "atomic");

        // (s_y + s_n) - (p_y*s_y + p_n*s_n) - (f_y + f_n) - slippage
        let expected = dec!(20) - (dec!(4.8) + dec!(5.0)) - dec!(0.10) - dec!(0);
        assert_eq!(update.simulated_pnl, expected);
        assert_eq!(update.realized_pnl, dec!(0));
        assert!(update.is_simulated);
    }

    #[test]
    fn slippage_cost_is_attributed() {
        let tracker = PnLTracker::new();
        let mut fill_a = sim_fill("yes", dec!(0.50), dec!(10), dec!(0));
        let mut fill_b = sim_fill("no", dec!(0.50), dec!(10), dec!(0));
        fill_a.slippage_bps = Some(100); // 1%
        fill_b.slippage_bps = Some(100);

        let update = tracker.process_fills(&[fill_a, fill_b], dec!(0), "trace-1", "atomic");
        // Each leg: 5.0 notional * 1% = 0.05.
        assert_eq!(update.slippage_cost, dec!(0.10));
    }

    #[test]
    fn simulated_fills_never_touch_realized() {
        let tracker = PnLTracker::new();
        let fills = vec![
            sim_fill("yes", dec!(0.48), dec!(10), dec!(0)),
            sim_fill("no", dec!(0.50), dec!(10), dec!(0)),
        ];
        tracker.process_fills(&fills, dec!(0.20), "trace-1", "atomic");

        let summary = tracker.summary();
        assert!(summary.cumulative_simulated_pnl > dec!(0));
        assert_eq!(summary.cumulative_realized_pnl, dec!(0));
    }

    #[test]
    fn confirmed_live_fills_move_realized() {
        let tracker = PnLTracker::new();
        let fills = vec![
            live_fill("yes", dec!(0.48), dec!(10), true),
            live_fill("no", dec!(0.50), dec!(10), true),
        ];
        tracker.process_fills(&fills, dec!(0.20), "trace-1", "atomic");

        let summary = tracker.summary();
        assert_eq!(summary.cumulative_simulated_pnl, dec!(0));
        assert_eq!(summary.cumulative_realized_pnl, dec!(10.2));
    }

    #[test]
    fn unconfirmed_live_fills_do_not_move_realized() {
        let tracker = PnLTracker::new();
        let fills = vec![
            live_fill("yes", dec!(0.48), dec!(10), true),
            live_fill("no", dec!(0.50), dec!(10), false),
        ];
        let update = tracker.process_fills(&fills, dec!(0.20), "trace-1", "atomic");

        assert_eq!(update.realized_pnl, dec!(0));
        assert_eq!(tracker.summary().cumulative_realized_pnl, dec!(0));
    }

    #[test]
    fn positions_track_per_token() {
        let tracker = PnLTracker::new();
        let fills = vec![
            sim_fill("yes", dec!(0.48), dec!(10), dec!(0)),
            sim_fill("no", dec!(0.50), dec!(7), dec!(0)),
        ];
        tracker.process_fills(&fills, dec!(0), "trace-1", "atomic");

        assert_eq!(tracker.position(&TokenId::from("yes")), dec!(10));
        assert_eq!(tracker.position(&TokenId::from("no")), dec!(7));
        assert_eq!(tracker.position(&TokenId::from("other")), dec!(0));
    }

    #[test]
    fn sells_reduce_positions() {
        let tracker = PnLTracker::new();
        let buy = sim_fill("tok", dec!(0.50), dec!(10), dec!(0));
        tracker.process_fills(&[buy], dec!(0), "trace-1", "single");

        let mut sell = sim_fill("tok", dec!(0.55), dec!(4), dec!(0));
        sell.side = Side::Sell;
        tracker.process_fills(&[sell], dec!(0), "trace-2", "single");

        assert_eq!(tracker.position(&TokenId::from("tok")), dec!(6));
    }

    #[test]
    fn empty_fills_produce_zero_update() {
        let tracker = PnLTracker::new();
        let update = tracker.process_fills(&[], dec!(0.20), "trace-1", "atomic");
        assert_eq!(update.simulated_pnl, dec!(0));
        assert_eq!(update.realized_pnl, dec!(0));
        assert!(update.token_ids.is_empty());
    }

    #[test]
    fn expected_edge_accumulates() {
        let tracker = PnLTracker::new();
        let fills = vec![
            sim_fill("yes", dec!(0.48), dec!(10), dec!(0)),
            sim_fill("no", dec!(0.50), dec!(10), dec!(0)),
        ];
        tracker.process_fills(&fills, dec!(0.20), "trace-1", "atomic");
        tracker.process_fills(&fills, dec!(0.30), "trace-2", "atomic");

        assert_eq!(tracker.summary().cumulative_expected_edge, dec!(0.50));
        assert_eq!(tracker.summary().updates, 2);
    }
}
