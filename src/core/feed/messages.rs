//! Feed wire message types.
//!
//! Numeric fields arrive as strings and are parsed to decimals at the
//! boundary; unparseable levels are dropped rather than failing the
//! whole message.

use serde::{Deserialize, Serialize};

use crate::core::domain::{LevelDelta, PriceLevel};

/// Subscription request sent to the feed.
#[derive(Debug, Serialize)]
pub struct SubscribeMessage {
    pub action: SubscribeAction,
    pub tokens: Vec<String>,
}

/// Action field of a subscription message.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeAction {
    Subscribe,
    Unsubscribe,
}

impl SubscribeMessage {
    /// Build a subscribe request for the given token IDs.
    #[must_use]
    pub fn subscribe(tokens: Vec<String>) -> Self {
        Self {
            action: SubscribeAction::Subscribe,
            tokens,
        }
    }

    /// Build an unsubscribe request for the given token IDs.
    #[must_use]
    pub fn unsubscribe(tokens: Vec<String>) -> Self {
        Self {
            action: SubscribeAction::Unsubscribe,
            tokens,
        }
    }
}

/// A price level as received from the wire (strings, not decimals).
#[derive(Debug, Clone, Deserialize)]
pub struct WireLevel {
    pub price: String,
    pub size: String,
}

impl WireLevel {
    fn to_level(&self) -> Option<PriceLevel> {
        Some(PriceLevel::new(
            self.price.parse().ok()?,
            self.size.parse().ok()?,
        ))
    }

    fn to_delta(&self) -> Option<LevelDelta> {
        Some(LevelDelta {
            price: self.price.parse().ok()?,
            size: self.size.parse().ok()?,
        })
    }
}

/// Messages received from the feed.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedMessage {
    /// Full book replacement.
    Snapshot {
        token_id: String,
        #[serde(default)]
        bids: Vec<WireLevel>,
        #[serde(default)]
        asks: Vec<WireLevel>,
        #[serde(default)]
        sequence_number: Option<u64>,
    },
    /// Per-level upserts; a level with size 0 removes it.
    Update {
        token_id: String,
        #[serde(default)]
        bids: Vec<WireLevel>,
        #[serde(default)]
        asks: Vec<WireLevel>,
        #[serde(default)]
        sequence_number: Option<u64>,
    },
    #[serde(other)]
    Unknown,
}

/// Parse wire levels into full price levels, dropping malformed entries.
#[must_use]
pub(crate) fn parse_levels(levels: &[WireLevel]) -> Vec<PriceLevel> {
    levels.iter().filter_map(WireLevel::to_level).collect()
}

/// Parse wire levels into deltas, dropping malformed entries.
///
/// Unlike [`parse_levels`], zero sizes survive here: a zero-size delta
/// is the removal instruction.
#[must_use]
pub(crate) fn parse_deltas(levels: &[WireLevel]) -> Vec<LevelDelta> {
    levels.iter().filter_map(WireLevel::to_delta).collect()
}
