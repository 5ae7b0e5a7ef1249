//! Volume-weighted average price over book depth.
//!
//! Walks levels in book order (best price first), consuming liquidity
//! until the target is exhausted or depth runs out. Callers pass
//! `book.asks()` to price a buy and `book.bids()` to price a sell.

use rust_decimal::Decimal;

use crate::core::domain::{Notional, Price, PriceLevel, Volume};

/// Result of a depth walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VwapResult {
    /// Average fill price (total cost / total shares). Zero when no
    /// shares were acquired.
    pub avg_price: Price,
    /// Shares acquired by the walk.
    pub shares: Volume,
    /// Notional consumed by the walk.
    pub cost: Notional,
    /// True iff the full target was satisfied.
    pub filled: bool,
}

impl VwapResult {
    const fn empty(filled: bool) -> Self {
        Self {
            avg_price: Decimal::ZERO,
            shares: Decimal::ZERO,
            cost: Decimal::ZERO,
            filled,
        }
    }
}

/// Walk depth to consume a target notional.
///
/// Edge cases: an empty side is unfillable; a zero target fills
/// instantly at the best price with zero shares.
#[must_use]
pub fn walk_notional(levels: &[PriceLevel], target: Notional) -> VwapResult {
    let Some(best) = levels.first() else {
        return VwapResult::empty(false);
    };
    if target <= Decimal::ZERO {
        return VwapResult {
            avg_price: best.price(),
            shares: Decimal::ZERO,
            cost: Decimal::ZERO,
            filled: true,
        };
    }

    let mut remaining = target;
    let mut total_cost = Decimal::ZERO;
    let mut total_shares = Decimal::ZERO;

    for level in levels {
        if remaining <= Decimal::ZERO {
            break;
        }

        let level_value = level.notional();
        if level_value >= remaining {
            // This level can satisfy the rest of the target.
            total_shares += remaining / level.price();
            total_cost += remaining;
            remaining = Decimal::ZERO;
            break;
        }
        total_cost += level_value;
        total_shares += level.size();
        remaining -= level_value;
    }

    finish(total_cost, total_shares, remaining == Decimal::ZERO)
}

/// Walk depth to acquire a target number of shares.
#[must_use]
pub fn walk_shares(levels: &[PriceLevel], target: Volume) -> VwapResult {
    let Some(best) = levels.first() else {
        return VwapResult::empty(false);
    };
    if target <= Decimal::ZERO {
        return VwapResult {
            avg_price: best.price(),
            shares: Decimal::ZERO,
            cost: Decimal::ZERO,
            filled: true,
        };
    }

    let mut remaining = target;
    let mut total_cost = Decimal::ZERO;
    let mut total_shares = Decimal::ZERO;

    for level in levels {
        if remaining <= Decimal::ZERO {
            break;
        }

        if level.size() >= remaining {
            total_cost += remaining * level.price();
            total_shares += remaining;
            remaining = Decimal::ZERO;
            break;
        }
        total_cost += level.notional();
        total_shares += level.size();
        remaining -= level.size();
    }

    finish(total_cost, total_shares, remaining == Decimal::ZERO)
}

fn finish(total_cost: Notional, total_shares: Volume, filled: bool) -> VwapResult {
    let avg_price = if total_shares > Decimal::ZERO {
        total_cost / total_shares
    } else {
        Decimal::ZERO
    };
    VwapResult {
        avg_price,
        shares: total_shares,
        cost: total_cost,
        filled,
    }
}
