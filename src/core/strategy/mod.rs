//! VWAP engine and arbitrage detectors.
//!
//! Detectors are pure functions over book snapshots: they return
//! `Option<Signal>` and apply no fees, gas, or slippage; cost
//! attribution belongs to the risk gate.

mod atomic;
mod multi_outcome;
mod vwap;

pub use atomic::AtomicArbitrage;
pub use multi_outcome::MultiOutcomeArbitrage;
pub use vwap::{walk_notional, walk_shares, VwapResult};
