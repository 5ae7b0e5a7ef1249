//! Application orchestration and configuration.

mod config;
mod engine;

pub use config::{
    init_logging, ChainConfig, Config, ExecutionMode, FeedConfig, TelemetryConfig, TradingConfig,
};
pub use engine::Engine;
