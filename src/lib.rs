//! Evenmoney - Prediction market arbitrage detection and execution core.
//!
//! Converts a live stream of order-book updates into risk-gated, signed,
//! resilient on-chain orders, with a congruent dry-run path feeding the
//! same fill-driven PnL ledger.
//!
//! # Architecture
//!
//! ```text
//! src/
//! ├── core/             # Reusable library components
//! │   ├── domain/       # Pure domain types
//! │   ├── book/         # Thread-safe order book store
//! │   ├── feed/         # Streaming market data ingestion
//! │   ├── strategy/     # VWAP engine + arbitrage detectors
//! │   ├── risk/         # Risk gate + anomaly guard
//! │   ├── execution/    # Nonce/retry/breaker plumbing + executors
//! │   ├── chain/        # JSON-RPC client + EIP-712 order signing
//! │   └── telemetry/    # Trace ids, JSONL event log, latency windows
//! └── app/              # Engine orchestration + configuration
//! ```

pub mod app;
pub mod core;
pub mod error;
