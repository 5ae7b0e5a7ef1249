//! JSON-RPC chain client over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::{hex, Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::client::{ChainClient, TxReceipt};
use super::{USDC_ADDRESS, USDC_DECIMALS};
use crate::error::{Error, Result};

sol! {
    function balanceOf(address owner) external view returns (uint256);
    function allowance(address owner, address spender) external view returns (uint256);
}

/// JSON-RPC client for an EVM node.
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a client for the given RPC endpoint.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: serde_json::Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "RPC call");

        let response: serde_json::Value = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown RPC error");
            return Err(Error::Rpc(message.to_string()));
        }

        let result = response
            .get("result")
            .cloned()
            .ok_or_else(|| Error::Rpc(format!("{method}: missing result")))?;
        Ok(serde_json::from_value(result)?)
    }

    async fn eth_call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>> {
        let result: String = self
            .call(
                "eth_call",
                json!([{ "to": to.to_string(), "data": hex::encode_prefixed(&data) }, "latest"]),
            )
            .await?;
        hex::decode(&result).map_err(|e| Error::Rpc(format!("bad eth_call result: {e}")))
    }

    fn decode_uint(data: &[u8], context: &str) -> Result<U256> {
        if data.len() < 32 {
            return Err(Error::Rpc(format!("{context}: short return data")));
        }
        Ok(U256::from_be_slice(&data[..32]))
    }

    fn parse_quantity(value: &str, context: &str) -> Result<u128> {
        u128::from_str_radix(value.trim_start_matches("0x"), 16)
            .map_err(|e| Error::Rpc(format!("{context}: {e}")))
    }

    fn units_to_decimal(raw: U256, decimals: u32) -> Decimal {
        // USDC amounts fit comfortably in u128.
        let raw: u128 = raw.try_into().unwrap_or(u128::MAX);
        Decimal::from(raw) / Decimal::from(10u128.pow(decimals))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn usdc_balance(&self, owner: Address) -> Result<Decimal> {
        let data = balanceOfCall { owner }.abi_encode();
        let raw = self.eth_call(USDC_ADDRESS, data).await?;
        let value = Self::decode_uint(&raw, "balanceOf")?;
        Ok(Self::units_to_decimal(value, USDC_DECIMALS))
    }

    async fn usdc_allowance(&self, owner: Address, spender: Address) -> Result<Decimal> {
        let data = allowanceCall { owner, spender }.abi_encode();
        let raw = self.eth_call(USDC_ADDRESS, data).await?;
        let value = Self::decode_uint(&raw, "allowance")?;
        Ok(Self::units_to_decimal(value, USDC_DECIMALS))
    }

    async fn estimate_gas(&self, from: Address, to: Address, data: &Bytes) -> Result<u64> {
        let result: String = self
            .call(
                "eth_estimateGas",
                json!([{
                    "from": from.to_string(),
                    "to": to.to_string(),
                    "data": hex::encode_prefixed(data),
                }]),
            )
            .await?;
        Ok(Self::parse_quantity(&result, "eth_estimateGas")? as u64)
    }

    async fn latest_base_fee(&self) -> Result<u128> {
        let block: serde_json::Value = self
            .call("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let base_fee = block
            .get("baseFeePerGas")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Rpc("latest block missing baseFeePerGas".into()))?;
        Self::parse_quantity(base_fee, "baseFeePerGas")
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        let result: String = self
            .call(
                "eth_getTransactionCount",
                json!([address.to_string(), "pending"]),
            )
            .await?;
        Ok(Self::parse_quantity(&result, "eth_getTransactionCount")? as u64)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let result: String = self
            .call("eth_sendRawTransaction", json!([hex::encode_prefixed(raw)]))
            .await?;
        result
            .parse()
            .map_err(|e| Error::Rpc(format!("bad tx hash: {e}")))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>> {
        let receipt: serde_json::Value = self
            .call("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        if receipt.is_null() {
            return Ok(None);
        }

        let status = receipt
            .get("status")
            .and_then(|v| v.as_str())
            .map(|s| Self::parse_quantity(s, "status"))
            .transpose()?
            .unwrap_or(0);
        let gas_used = receipt
            .get("gasUsed")
            .and_then(|v| v.as_str())
            .map(|s| Self::parse_quantity(s, "gasUsed"))
            .transpose()?
            .unwrap_or(0);
        let effective_gas_price = receipt
            .get("effectiveGasPrice")
            .and_then(|v| v.as_str())
            .map(|s| Self::parse_quantity(s, "effectiveGasPrice"))
            .transpose()?
            .unwrap_or(0);

        Ok(Some(TxReceipt {
            tx_hash: hash,
            success: status == 1,
            gas_used,
            effective_gas_price,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_uint_return_data() {
        let mut data = vec![0u8; 32];
        data[31] = 42;
        assert_eq!(
            RpcClient::decode_uint(&data, "test").unwrap(),
            U256::from(42)
        );
    }

    #[test]
    fn short_return_data_is_an_error() {
        assert!(RpcClient::decode_uint(&[0u8; 4], "test").is_err());
    }

    #[test]
    fn parses_hex_quantities() {
        assert_eq!(RpcClient::parse_quantity("0x1a", "test").unwrap(), 26);
        assert_eq!(RpcClient::parse_quantity("0x0", "test").unwrap(), 0);
        assert!(RpcClient::parse_quantity("bogus", "test").is_err());
    }

    #[test]
    fn converts_usdc_units() {
        use rust_decimal_macros::dec;
        let value = RpcClient::units_to_decimal(U256::from(12_500_000u64), USDC_DECIMALS);
        assert_eq!(value, dec!(12.5));
    }

    #[test]
    fn erc20_calldata_has_selector_and_arg() {
        let owner = Address::ZERO;
        let data = balanceOfCall { owner }.abi_encode();
        // 4-byte selector + one 32-byte argument.
        assert_eq!(data.len(), 36);
        // keccak("balanceOf(address)")[..4]
        assert_eq!(&data[..4], &[0x70, 0xa0, 0x82, 0x31]);
    }
}
