//! Order book types.
//!
//! A book holds one token's resting liquidity: bids sorted by price
//! descending, asks ascending, with no zero-size levels and at most one
//! level per price. Snapshots replace the book wholesale; deltas upsert
//! individual levels (a delta with size 0 removes the level).

use rust_decimal::Decimal;

use super::id::TokenId;
use super::money::{Notional, Price, Volume};

/// A single price level in the order book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    price: Price,
    size: Volume,
}

impl PriceLevel {
    /// Create a new price level.
    #[must_use]
    pub const fn new(price: Price, size: Volume) -> Self {
        Self { price, size }
    }

    /// Get the price.
    #[must_use]
    pub const fn price(&self) -> Price {
        self.price
    }

    /// Get the size.
    #[must_use]
    pub const fn size(&self) -> Volume {
        self.size
    }

    /// Notional value resting at this level (price * size).
    #[must_use]
    pub fn notional(&self) -> Notional {
        self.price * self.size
    }
}

/// An incremental change to one price level. Size 0 removes the level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelDelta {
    pub price: Price,
    pub size: Volume,
}

/// Order book for a single token.
#[derive(Debug, Clone)]
pub struct OrderBook {
    token_id: TokenId,
    bids: Vec<PriceLevel>,
    asks: Vec<PriceLevel>,
    last_update_ms: i64,
    sequence: Option<u64>,
}

impl OrderBook {
    /// Create a new empty order book.
    #[must_use]
    pub const fn new(token_id: TokenId) -> Self {
        Self {
            token_id,
            bids: Vec::new(),
            asks: Vec::new(),
            last_update_ms: 0,
            sequence: None,
        }
    }

    /// Create an order book from snapshot levels.
    ///
    /// Levels are sorted and sanitized: non-positive sizes or prices are
    /// dropped, bids ordered descending, asks ascending.
    #[must_use]
    pub fn with_levels(token_id: TokenId, bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        let mut book = Self::new(token_id);
        book.replace(bids, asks, 0, None);
        book
    }

    /// Get the token ID.
    #[must_use]
    pub const fn token_id(&self) -> &TokenId {
        &self.token_id
    }

    /// Get all bid levels, best (highest) first.
    #[must_use]
    pub fn bids(&self) -> &[PriceLevel] {
        &self.bids
    }

    /// Get all ask levels, best (lowest) first.
    #[must_use]
    pub fn asks(&self) -> &[PriceLevel] {
        &self.asks
    }

    /// Best bid (highest buy price).
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask (lowest sell price).
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Timestamp of the last applied message (ms since epoch).
    #[must_use]
    pub const fn last_update_ms(&self) -> i64 {
        self.last_update_ms
    }

    /// Last seen sequence number, when the feed provides one.
    #[must_use]
    pub const fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Total notional resting on the ask side.
    #[must_use]
    pub fn ask_depth(&self) -> Notional {
        self.asks.iter().map(PriceLevel::notional).sum()
    }

    /// Total notional resting on the bid side.
    #[must_use]
    pub fn bid_depth(&self) -> Notional {
        self.bids.iter().map(PriceLevel::notional).sum()
    }

    /// Replace the full book from a snapshot.
    pub fn replace(
        &mut self,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp_ms: i64,
        sequence: Option<u64>,
    ) {
        self.bids = Self::sanitize(bids, true);
        self.asks = Self::sanitize(asks, false);
        self.touch(timestamp_ms, sequence);
    }

    /// Apply per-level deltas from an update message.
    pub fn apply_deltas(
        &mut self,
        bid_deltas: &[LevelDelta],
        ask_deltas: &[LevelDelta],
        timestamp_ms: i64,
        sequence: Option<u64>,
    ) {
        for delta in bid_deltas {
            Self::upsert(&mut self.bids, delta);
        }
        for delta in ask_deltas {
            Self::upsert(&mut self.asks, delta);
        }
        self.bids.sort_by(|a, b| b.price.cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.cmp(&b.price));
        self.touch(timestamp_ms, sequence);
    }

    /// Check the structural invariants: strict price ordering on both
    /// sides and strictly positive sizes everywhere.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        let bids_descending = self.bids.windows(2).all(|w| w[0].price > w[1].price);
        let asks_ascending = self.asks.windows(2).all(|w| w[0].price < w[1].price);
        let sizes_positive = self
            .bids
            .iter()
            .chain(self.asks.iter())
            .all(|l| l.size > Decimal::ZERO && l.price > Decimal::ZERO);
        bids_descending && asks_ascending && sizes_positive
    }

    fn touch(&mut self, timestamp_ms: i64, sequence: Option<u64>) {
        // last_update_ms is monotonic per token even if the feed's own
        // timestamps jitter backwards.
        self.last_update_ms = self.last_update_ms.max(timestamp_ms);
        if sequence.is_some() {
            self.sequence = sequence;
        }
    }

    fn sanitize(mut levels: Vec<PriceLevel>, descending: bool) -> Vec<PriceLevel> {
        levels.retain(|l| l.size > Decimal::ZERO && l.price > Decimal::ZERO);
        if descending {
            levels.sort_by(|a, b| b.price.cmp(&a.price));
        } else {
            levels.sort_by(|a, b| a.price.cmp(&b.price));
        }
        levels.dedup_by(|a, b| a.price == b.price);
        levels
    }

    fn upsert(levels: &mut Vec<PriceLevel>, delta: &LevelDelta) {
        levels.retain(|l| l.price != delta.price);
        if delta.size > Decimal::ZERO && delta.price > Decimal::ZERO {
            levels.push(PriceLevel::new(delta.price, delta.size));
        }
    }
}
