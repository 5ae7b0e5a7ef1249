//! Chain client abstraction.
//!
//! The execution pipeline consumes exactly this call surface; live
//! transports implement it over JSON-RPC and tests implement it with
//! scripted fakes.

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::Result;

/// EIP-1559 fee envelope in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeEnvelope {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl FeeEnvelope {
    /// Standard envelope: `base_fee * 2 + tip`, capped.
    ///
    /// Doubling the base fee keeps the transaction includable across
    /// several consecutive maximum base-fee increases.
    #[must_use]
    pub fn compute(base_fee: u128, tip: u128, max_gas_price: u128) -> Self {
        let max_fee = (base_fee * 2 + tip).min(max_gas_price);
        Self {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: tip.min(max_fee),
        }
    }
}

/// A mined transaction receipt, reduced to the fields the pipeline
/// consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    /// True iff receipt status == 1.
    pub success: bool,
    pub gas_used: u128,
    pub effective_gas_price: u128,
}

impl TxReceipt {
    /// Gas cost in the chain's native token, as a decimal.
    #[must_use]
    pub fn gas_cost_native(&self) -> Decimal {
        let wei = self.gas_used.saturating_mul(self.effective_gas_price);
        Decimal::from(wei) / Decimal::from(10u128.pow(18))
    }
}

/// Calls the execution pipeline requires of a chain transport.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Numeraire (USDC) balance of an address, in whole tokens.
    async fn usdc_balance(&self, owner: Address) -> Result<Decimal>;

    /// Numeraire allowance granted by `owner` to `spender`.
    async fn usdc_allowance(&self, owner: Address, spender: Address) -> Result<Decimal>;

    /// Gas estimate for a contract call.
    async fn estimate_gas(&self, from: Address, to: Address, data: &Bytes) -> Result<u64>;

    /// Base fee of the latest block, in wei.
    async fn latest_base_fee(&self) -> Result<u128>;

    /// Current transaction count (pending) for an address.
    async fn transaction_count(&self, address: Address) -> Result<u64>;

    /// Broadcast raw signed transaction bytes; returns the tx hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256>;

    /// Fetch a receipt by hash. `None` while the transaction is
    /// unmined.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn fee_envelope_doubles_base_and_adds_tip() {
        let envelope = FeeEnvelope::compute(50, 10, 1_000);
        assert_eq!(envelope.max_fee_per_gas, 110);
        assert_eq!(envelope.max_priority_fee_per_gas, 10);
    }

    #[test]
    fn fee_envelope_honours_cap() {
        let envelope = FeeEnvelope::compute(600, 50, 1_000);
        assert_eq!(envelope.max_fee_per_gas, 1_000);
        assert_eq!(envelope.max_priority_fee_per_gas, 50);
    }

    #[test]
    fn tip_never_exceeds_max_fee() {
        let envelope = FeeEnvelope::compute(10, 500, 100);
        assert_eq!(envelope.max_fee_per_gas, 100);
        assert_eq!(envelope.max_priority_fee_per_gas, 100);
    }

    #[test]
    fn receipt_gas_cost_converts_from_wei() {
        let receipt = TxReceipt {
            tx_hash: B256::ZERO,
            success: true,
            gas_used: 100_000,
            effective_gas_price: 30_000_000_000, // 30 gwei
        };
        assert_eq!(receipt.gas_cost_native(), dec!(0.003));
    }
}
