//! Typed configuration for the trading core.
//!
//! The core defines the types, defaults, and validation; loading from
//! files or the environment is the embedding application's job. A TOML
//! parse helper is provided for embedders that hold the raw text.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::execution::{CircuitBreakerConfig, LiveExecutorConfig, RetryConfig, SimulatedExecutorConfig};
use crate::core::feed::ReconnectionConfig;
use crate::core::risk::{AnomalyGuardConfig, RiskLimits};
use crate::error::{Error, Result};

/// Execution mode for the router.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Simulated fills against local books.
    #[default]
    DryRun,
    /// Signed on-chain orders.
    Live,
}

/// Feed connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default)]
    pub reconnection: ReconnectionConfig,
    /// Fingerprints kept by the wire-level deduplicator.
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

fn default_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_dedup_capacity() -> usize {
    4_096
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            reconnection: ReconnectionConfig::default(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

/// Chain transport settings. The private key is only required in live
/// mode and is expected to arrive via the environment, never a file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChainConfig {
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub private_key: Option<String>,
}

/// Strategy sizing and cost assumptions.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Notional committed per atomic leg.
    #[serde(default = "default_trade_size")]
    pub trade_size: Decimal,
    /// Basket units acquired by the multi-outcome strategy.
    #[serde(default = "default_basket_units")]
    pub basket_units: Decimal,
    /// Venue fee rate used for pre-trade cost estimates.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Gas estimate used by the risk gate before execution.
    #[serde(default)]
    pub gas_estimate: Decimal,
    /// Balance assumed by the risk gate in dry-run mode.
    #[serde(default = "default_dry_run_balance")]
    pub dry_run_balance: Decimal,
}

fn default_trade_size() -> Decimal {
    Decimal::new(10, 0)
}

fn default_basket_units() -> Decimal {
    Decimal::ONE
}

fn default_fee_rate() -> Decimal {
    Decimal::new(35, 4)
}

fn default_dry_run_balance() -> Decimal {
    Decimal::new(1_000, 0)
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            trade_size: default_trade_size(),
            basket_units: default_basket_units(),
            fee_rate: default_fee_rate(),
            gas_estimate: Decimal::ZERO,
            dry_run_balance: default_dry_run_balance(),
        }
    }
}

/// Telemetry sink settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_events_path")]
    pub events_path: PathBuf,
    #[serde(default = "default_latency_window_secs")]
    pub latency_window_secs: u64,
}

fn default_events_path() -> PathBuf {
    PathBuf::from("logs/events.jsonl")
}

fn default_latency_window_secs() -> u64 {
    60
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            events_path: default_events_path(),
            latency_window_secs: default_latency_window_secs(),
        }
    }
}

/// Full core configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: ExecutionMode,
    pub feed: FeedConfig,
    pub chain: ChainConfig,
    pub trading: TradingConfig,
    pub risk: RiskLimits,
    pub anomaly: AnomalyGuardConfig,
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    pub simulated_executor: SimulatedExecutorConfig,
    pub live_executor: LiveExecutorConfig,
    pub telemetry: TelemetryConfig,
    /// TTL for idempotency keys, in seconds.
    pub idempotency_ttl_secs: Option<u64>,
    /// Concurrent executions admitted before backpressure rejects.
    pub max_in_flight: Option<usize>,
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field requirements.
    pub fn validate(&self) -> Result<()> {
        if self.trading.trade_size <= Decimal::ZERO {
            return Err(Error::Config("trade_size must be positive".into()));
        }
        if self.mode == ExecutionMode::Live {
            if self.chain.rpc_url.is_empty() {
                return Err(Error::Config("live mode requires chain.rpc_url".into()));
            }
            if self
                .chain
                .private_key
                .as_deref()
                .map(str::trim)
                .unwrap_or("")
                .is_empty()
            {
                return Err(Error::Config("live mode requires chain.private_key".into()));
            }
        }
        Ok(())
    }

    /// Idempotency TTL with default.
    #[must_use]
    pub fn idempotency_ttl_secs(&self) -> u64 {
        self.idempotency_ttl_secs.unwrap_or(3_600)
    }

    /// Execution admission bound with default.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.unwrap_or(4)
    }
}

/// Install the global tracing subscriber.
///
/// Filtering follows `RUST_LOG`; `json` switches to line-JSON output
/// for log shippers. Calling twice is a no-op.
pub fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // Subscriber already installed by the embedder.
    drop(result);
}
