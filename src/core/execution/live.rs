//! Live execution against the CTF Exchange.
//!
//! Each leg becomes a signed typed-data order wrapped in an EIP-1559
//! transaction: allowance preflight, order build and sign, fee
//! envelope, gas estimate with a safety margin, nonce allocation, raw
//! broadcast through the retry policy, then receipt polling. A receipt
//! timeout reports the fill as pending, never failed. Legs run
//! sequentially; the first failure stops the basket and the partial
//! state is surfaced to the caller.

use std::sync::Arc;
use std::time::Duration;

use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use super::nonce::NonceManager;
use super::retry::RetryPolicy;
use super::router::LegFailure;
use crate::core::chain::{
    ChainClient, FeeEnvelope, OrderSigner, TxReceipt, CHAIN_ID, EXCHANGE_ADDRESS,
};
use crate::core::domain::{Fill, Signal, SignalLeg};
use crate::core::telemetry::{now_ms, EventLog, EventType};
use crate::error::{Error, ExecutionError, Result};

/// Live executor tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveExecutorConfig {
    /// Venue fee rate applied to notional.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Order expiration horizon in seconds.
    #[serde(default = "default_order_expiration_secs")]
    pub order_expiration_secs: u64,
    /// Priority fee (tip) in gwei.
    #[serde(default = "default_priority_fee_gwei")]
    pub priority_fee_gwei: u64,
    /// Ceiling on the max fee per gas, in gwei.
    #[serde(default = "default_max_gas_price_gwei")]
    pub max_gas_price_gwei: u64,
    /// Safety multiplier applied to gas estimates.
    #[serde(default = "default_gas_safety_multiplier")]
    pub gas_safety_multiplier: f64,
    /// How long to poll for a receipt before reporting pending.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
    /// Poll interval while waiting for a receipt.
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(35, 4)
}

fn default_order_expiration_secs() -> u64 {
    3_600
}

fn default_priority_fee_gwei() -> u64 {
    30
}

fn default_max_gas_price_gwei() -> u64 {
    500
}

fn default_gas_safety_multiplier() -> f64 {
    1.2
}

fn default_receipt_timeout_secs() -> u64 {
    60
}

fn default_receipt_poll_interval_ms() -> u64 {
    2_000
}

impl Default for LiveExecutorConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            order_expiration_secs: default_order_expiration_secs(),
            priority_fee_gwei: default_priority_fee_gwei(),
            max_gas_price_gwei: default_max_gas_price_gwei(),
            gas_safety_multiplier: default_gas_safety_multiplier(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
        }
    }
}

/// Result of executing all legs of one signal live.
#[derive(Debug)]
pub struct LiveOutcome {
    pub fills: Vec<Fill>,
    pub failures: Vec<LegFailure>,
    /// Total observed gas cost across mined legs, in native token.
    pub gas_cost: Decimal,
}

/// Executes signals as signed on-chain orders.
pub struct LiveExecutor {
    config: LiveExecutorConfig,
    signer: OrderSigner,
    chain: Arc<dyn ChainClient>,
    nonces: Arc<NonceManager>,
    retry: RetryPolicy,
    event_log: Option<Arc<EventLog>>,
}

impl LiveExecutor {
    /// Create a live executor.
    pub fn new(
        config: LiveExecutorConfig,
        signer: OrderSigner,
        chain: Arc<dyn ChainClient>,
        nonces: Arc<NonceManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            config,
            signer,
            chain,
            nonces,
            retry,
            event_log: None,
        }
    }

    /// Attach a telemetry sink.
    #[must_use]
    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// The sender address.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Seed the nonce manager from the on-chain transaction count.
    pub async fn initialize(&self) -> Result<()> {
        let count = self.chain.transaction_count(self.address()).await?;
        self.nonces.initialize(count);
        info!(address = %self.address(), nonce = count, "Live executor initialized");
        Ok(())
    }

    /// Free numeraire balance of the sender.
    pub async fn balance(&self) -> Result<Decimal> {
        self.chain.usdc_balance(self.address()).await
    }

    /// Execute every leg of a signal sequentially.
    ///
    /// The allowance preflight refuses the whole basket before any
    /// side effects; auto-approval never happens in the hot path.
    pub async fn execute_signal(&self, signal: &Signal) -> Result<LiveOutcome> {
        self.check_allowance(signal.total_cost()).await?;

        let trace_id = signal.header().trace_id().to_string();
        let mut outcome = LiveOutcome {
            fills: Vec::with_capacity(signal.legs().len()),
            failures: Vec::new(),
            gas_cost: Decimal::ZERO,
        };

        for leg in signal.legs() {
            match self.execute_leg(leg, &trace_id).await {
                Ok((fill, gas_cost)) => {
                    outcome.gas_cost += gas_cost;
                    outcome.fills.push(fill);
                }
                Err(e) => {
                    warn!(
                        token_id = %leg.token_id,
                        error = %e,
                        "Leg failed, stopping basket"
                    );
                    outcome.failures.push(LegFailure {
                        token_id: leg.token_id.clone(),
                        error: e.to_string(),
                    });
                    // No in-flight unwinding: the partial position is
                    // reported upstream and left to the operator.
                    break;
                }
            }
        }

        Ok(outcome)
    }

    async fn check_allowance(&self, need: Decimal) -> Result<()> {
        let allowance = self
            .chain
            .usdc_allowance(self.address(), EXCHANGE_ADDRESS)
            .await?;
        if allowance < need {
            return Err(ExecutionError::InsufficientAllowance {
                have: allowance.to_string(),
                need: need.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn execute_leg(&self, leg: &SignalLeg, trace_id: &str) -> Result<(Fill, Decimal)> {
        let order = self.signer.build_order(
            &leg.token_id,
            leg.side,
            leg.notional,
            leg.price,
            self.config.order_expiration_secs,
        )?;
        let signature = self.signer.sign_order(&order)?;
        let calldata: Bytes = OrderSigner::fill_order_calldata(order, &signature).into();

        let base_fee = self.chain.latest_base_fee().await?;
        let envelope = FeeEnvelope::compute(
            base_fee,
            gwei(self.config.priority_fee_gwei),
            gwei(self.config.max_gas_price_gwei),
        );

        let estimate = self
            .chain
            .estimate_gas(self.address(), EXCHANGE_ADDRESS, &calldata)
            .await?;
        let gas_limit = (estimate as f64 * self.config.gas_safety_multiplier) as u64;

        let nonce = self.nonces.allocate().map_err(Error::Execution)?;
        let raw = self.build_raw_transaction(nonce, gas_limit, envelope, calldata)?;

        let sent = self
            .retry
            .execute(
                |_attempt| {
                    let raw = raw.clone();
                    async move { self.chain.send_raw_transaction(&raw).await }
                },
                |error, attempt| {
                    warn!(nonce, attempt, error = %error, "Broadcast retry");
                },
            )
            .await;

        let tx_hash = match sent {
            Ok(hash) => hash,
            Err(e) => {
                // Never broadcast: the nonce is safe to reuse.
                self.nonces.mark_failed(nonce);
                return Err(e);
            }
        };

        info!(
            token_id = %leg.token_id,
            tx_hash = %tx_hash,
            nonce,
            "Order submitted"
        );
        if let Some(log) = &self.event_log {
            log.emit(
                EventType::OrderSubmitted,
                serde_json::json!({
                    "token_id": leg.token_id.as_str(),
                    "notional": leg.notional.to_string(),
                    "tx_hash": tx_hash.to_string(),
                    "nonce": nonce,
                }),
                Some(trace_id),
            );
        }

        let shares = leg.notional / leg.price;
        let fees = leg.notional * self.config.fee_rate;

        match self.await_receipt(tx_hash).await? {
            Some(receipt) if receipt.success => {
                self.nonces.mark_confirmed(nonce);
                let fill = Fill::live(
                    format!("live_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
                    format!("leg-{nonce}"),
                    trace_id,
                    leg.token_id.clone(),
                    leg.side,
                    leg.price,
                    shares,
                    fees,
                    now_ms(),
                    tx_hash.to_string(),
                    true,
                );
                Ok((fill, receipt.gas_cost_native()))
            }
            Some(receipt) => {
                // Mined but reverted: the chain's counter advanced, so
                // the nonce is spent.
                self.nonces.mark_confirmed(nonce);
                Err(ExecutionError::Reverted(format!(
                    "tx {tx_hash} reverted, gas {}",
                    receipt.gas_cost_native()
                ))
                .into())
            }
            None => {
                // Still pending: report the fill as unconfirmed and
                // leave the nonce in flight.
                warn!(tx_hash = %tx_hash, "Receipt timeout, reporting pending");
                let fill = Fill::live(
                    format!("live_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]),
                    format!("leg-{nonce}"),
                    trace_id,
                    leg.token_id.clone(),
                    leg.side,
                    leg.price,
                    shares,
                    fees,
                    now_ms(),
                    tx_hash.to_string(),
                    false,
                );
                Ok((fill, Decimal::ZERO))
            }
        }
    }

    fn build_raw_transaction(
        &self,
        nonce: u64,
        gas_limit: u64,
        envelope: FeeEnvelope,
        calldata: Bytes,
    ) -> Result<Vec<u8>> {
        let tx = TxEip1559 {
            chain_id: CHAIN_ID,
            nonce,
            gas_limit,
            max_fee_per_gas: envelope.max_fee_per_gas,
            max_priority_fee_per_gas: envelope.max_priority_fee_per_gas,
            to: TxKind::Call(EXCHANGE_ADDRESS),
            value: U256::ZERO,
            access_list: Default::default(),
            input: calldata,
        };
        let signature = self.signer.sign_hash(&tx.signature_hash())?;
        let signed = tx.into_signed(signature);
        let envelope = TxEnvelope::Eip1559(signed);
        let mut raw = Vec::new();
        envelope.encode_2718(&mut raw);
        Ok(raw)
    }

    async fn await_receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        let deadline = Instant::now() + Duration::from_secs(self.config.receipt_timeout_secs);
        loop {
            if let Some(receipt) = self.chain.transaction_receipt(tx_hash).await? {
                return Ok(Some(receipt));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(Duration::from_millis(self.config.receipt_poll_interval_ms)).await;
        }
    }
}

fn gwei(amount: u64) -> u128 {
    u128::from(amount) * 1_000_000_000
}
