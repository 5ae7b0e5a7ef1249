//! Arbitrage baskets and the registry that indexes them.
//!
//! A basket is a set of mutually exhaustive outcome tokens that settles
//! to exactly one unit of the numeraire per complete set. Binary
//! (YES/NO) pairs and N-outcome groups are distinct variants because
//! the detectors walk them differently.

use std::collections::HashMap;

use tracing::warn;

use super::id::{MarketId, TokenId};

/// A set of mutually exhaustive outcome tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Basket {
    /// A YES/NO pair.
    Binary {
        market_id: MarketId,
        question: String,
        yes_token: TokenId,
        no_token: TokenId,
    },
    /// N mutually exclusive outcomes, N >= 2.
    MultiOutcome {
        market_id: MarketId,
        question: String,
        token_ids: Vec<TokenId>,
    },
}

impl Basket {
    /// Create a binary basket.
    pub fn binary(
        market_id: MarketId,
        question: impl Into<String>,
        yes_token: TokenId,
        no_token: TokenId,
    ) -> Self {
        Self::Binary {
            market_id,
            question: question.into(),
            yes_token,
            no_token,
        }
    }

    /// Create a multi-outcome basket.
    pub fn multi_outcome(
        market_id: MarketId,
        question: impl Into<String>,
        token_ids: Vec<TokenId>,
    ) -> Self {
        Self::MultiOutcome {
            market_id,
            question: question.into(),
            token_ids,
        }
    }

    /// Get the market ID.
    #[must_use]
    pub const fn market_id(&self) -> &MarketId {
        match self {
            Self::Binary { market_id, .. } | Self::MultiOutcome { market_id, .. } => market_id,
        }
    }

    /// Get the market question.
    #[must_use]
    pub fn question(&self) -> &str {
        match self {
            Self::Binary { question, .. } | Self::MultiOutcome { question, .. } => question,
        }
    }

    /// Check if this is a binary (YES/NO) basket.
    #[must_use]
    pub const fn is_binary(&self) -> bool {
        matches!(self, Self::Binary { .. })
    }

    /// Get all token IDs in outcome order.
    #[must_use]
    pub fn token_ids(&self) -> Vec<&TokenId> {
        match self {
            Self::Binary {
                yes_token,
                no_token,
                ..
            } => vec![yes_token, no_token],
            Self::MultiOutcome { token_ids, .. } => token_ids.iter().collect(),
        }
    }

    /// Number of outcomes in the basket.
    #[must_use]
    pub fn outcome_count(&self) -> usize {
        match self {
            Self::Binary { .. } => 2,
            Self::MultiOutcome { token_ids, .. } => token_ids.len(),
        }
    }

    /// Whether the basket is structurally valid: at least two outcomes,
    /// all token IDs distinct.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let tokens = self.token_ids();
        if tokens.len() < 2 {
            return false;
        }
        let mut seen = std::collections::HashSet::new();
        tokens.iter().all(|t| seen.insert(t.as_str()))
    }
}

/// Registry mapping tokens to the basket they belong to.
///
/// Metadata discovery is the embedding application's job; the registry
/// only indexes the baskets it is given.
#[derive(Debug, Default)]
pub struct BasketRegistry {
    baskets: HashMap<MarketId, Basket>,
    token_to_market: HashMap<TokenId, MarketId>,
}

impl BasketRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of baskets, skipping invalid ones.
    #[must_use]
    pub fn from_baskets(baskets: Vec<Basket>) -> Self {
        let mut registry = Self::new();
        for basket in baskets {
            registry.insert(basket);
        }
        registry
    }

    /// Insert a basket, indexing its tokens. Invalid baskets are dropped.
    pub fn insert(&mut self, basket: Basket) {
        if !basket.is_valid() {
            warn!(
                market_id = %basket.market_id(),
                outcomes = basket.outcome_count(),
                "Dropping structurally invalid basket"
            );
            return;
        }
        for token in basket.token_ids() {
            self.token_to_market
                .insert(token.clone(), basket.market_id().clone());
        }
        self.baskets.insert(basket.market_id().clone(), basket);
    }

    /// Find the basket a token belongs to.
    #[must_use]
    pub fn basket_for_token(&self, token_id: &TokenId) -> Option<&Basket> {
        let market_id = self.token_to_market.get(token_id)?;
        self.baskets.get(market_id)
    }

    /// Get a basket by market ID.
    #[must_use]
    pub fn basket(&self, market_id: &MarketId) -> Option<&Basket> {
        self.baskets.get(market_id)
    }

    /// All registered baskets.
    pub fn baskets(&self) -> impl Iterator<Item = &Basket> {
        self.baskets.values()
    }

    /// The full set of tokens to subscribe to, across all baskets.
    #[must_use]
    pub fn subscription_tokens(&self) -> Vec<TokenId> {
        let mut tokens: Vec<TokenId> = self.token_to_market.keys().cloned().collect();
        tokens.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        tokens
    }

    /// Number of registered baskets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.baskets.len()
    }

    /// Returns true if no baskets are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.baskets.is_empty()
    }
}
