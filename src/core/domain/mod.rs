//! Core domain types.
//!
//! ## Market structure
//!
//! - [`Basket`] - A set of mutually exhaustive outcome tokens settling to 1 unit
//! - [`BasketRegistry`] - Registry mapping token IDs to their basket
//!
//! ## Order book
//!
//! - [`OrderBook`] - Per-token book with sorted bid/ask levels and sequence metadata
//! - [`PriceLevel`] - A single (price, size) level
//! - [`LevelDelta`] - An incremental per-level change (size 0 removes)
//!
//! ## Signals and decisions
//!
//! - [`Signal`] - Sum-typed candidate signal with a common header
//! - [`EdgeBreakdown`] - Cost attribution with ACCEPT/REJECT decision
//!
//! ## Execution
//!
//! - [`OrderRequest`] - One leg submitted for execution
//! - [`Fill`] - Unified fill shape for simulated and live execution
//!
//! ## Identifier types
//!
//! - [`MarketId`] - Unique market identifier
//! - [`TokenId`] - Unique outcome token identifier

mod basket;
mod edge;
mod fill;
mod id;
mod money;
mod order_book;
mod signal;

pub use basket::{Basket, BasketRegistry};
pub use edge::{net_edge, Decision, EdgeBreakdown, EdgeCosts, RejectCode, RiskTag};
pub use fill::{Fill, OrderRequest, Side};
pub use id::{MarketId, TokenId};
pub use money::{Notional, Price, Volume};
pub use order_book::{LevelDelta, OrderBook, PriceLevel};
pub use signal::{Signal, SignalHeader, SignalLeg};
