//! EIP-712 order construction and signing for the CTF Exchange.
//!
//! Orders are typed-data structs signed under the exchange's domain
//! separator. Amounts convert to integer base units: 6 decimals on the
//! numeraire side, 18 on the outcome token side. The signature wire
//! format is the 65-byte concatenation `r || s || v`.

use alloy_primitives::{Address, B256, U256};
use alloy_signer::{Signer, SignerSync};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{eip712_domain, sol, Eip712Domain, SolCall, SolStruct};
use rand::RngCore;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::{CHAIN_ID, EXCHANGE_ADDRESS, TOKEN_DECIMALS, USDC_DECIMALS};
use crate::core::domain::{Notional, Price, Side, TokenId};
use crate::core::telemetry::now_ms;
use crate::error::ExecutionError;

sol! {
    /// CTF Exchange order, as hashed and verified on-chain.
    #[derive(Debug, PartialEq, Eq)]
    struct Order {
        address maker;
        address taker;
        uint256 tokenId;
        uint256 makerAmount;
        uint256 takerAmount;
        uint256 expiration;
        uint256 salt;
    }

    function fillOrder(Order order, bytes signature);
}

fn exchange_domain() -> Eip712Domain {
    eip712_domain! {
        name: "Polymarket CTF Exchange",
        version: "1",
        chain_id: CHAIN_ID,
        verifying_contract: EXCHANGE_ADDRESS,
    }
}

/// Signs CTF Exchange orders with a local private key.
pub struct OrderSigner {
    signer: PrivateKeySigner,
    domain: Eip712Domain,
}

impl OrderSigner {
    /// Create a signer from a hex private key.
    pub fn new(private_key: &str) -> Result<Self, ExecutionError> {
        let signer: PrivateKeySigner = private_key
            .trim()
            .parse()
            .map_err(|e| ExecutionError::SigningFailed(format!("invalid private key: {e}")))?;
        Ok(Self {
            signer: signer.with_chain_id(Some(CHAIN_ID)),
            domain: exchange_domain(),
        })
    }

    /// The maker address derived from the key.
    #[must_use]
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Build an order for one leg.
    ///
    /// For buys the maker side is numeraire and the taker side outcome
    /// tokens; sells are the reverse. `expiration_horizon_secs` is
    /// added to the current time; salt is a fresh 256-bit random.
    pub fn build_order(
        &self,
        token_id: &TokenId,
        side: Side,
        notional: Notional,
        price: Price,
        expiration_horizon_secs: u64,
    ) -> Result<Order, ExecutionError> {
        if price <= Decimal::ZERO || notional <= Decimal::ZERO {
            return Err(ExecutionError::InvalidOrder(format!(
                "non-positive notional {notional} or price {price}"
            )));
        }

        let token_id_u256: U256 = token_id
            .as_str()
            .parse()
            .map_err(|e| ExecutionError::InvalidOrder(format!("bad token id: {e}")))?;

        let usdc_units = to_base_units(notional, USDC_DECIMALS)?;
        let token_units = to_base_units(notional / price, TOKEN_DECIMALS)?;

        let (maker_amount, taker_amount) = match side {
            Side::Buy => (usdc_units, token_units),
            Side::Sell => (token_units, usdc_units),
        };

        let expiration = now_ms() / 1000 + expiration_horizon_secs as i64;

        Ok(Order {
            maker: self.address(),
            // Zero taker: anyone may fill.
            taker: Address::ZERO,
            tokenId: token_id_u256,
            makerAmount: maker_amount,
            takerAmount: taker_amount,
            expiration: U256::from(expiration as u64),
            salt: random_salt(),
        })
    }

    /// EIP-712 signing hash of an order under the exchange domain.
    #[must_use]
    pub fn order_hash(&self, order: &Order) -> B256 {
        order.eip712_signing_hash(&self.domain)
    }

    /// Sign an order; returns the 65-byte `r || s || v` signature.
    pub fn sign_order(&self, order: &Order) -> Result<[u8; 65], ExecutionError> {
        let hash = self.order_hash(order);
        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| ExecutionError::SigningFailed(e.to_string()))?;
        Ok(signature.as_bytes())
    }

    /// Sign an arbitrary 32-byte hash (transaction signing).
    pub fn sign_hash(
        &self,
        hash: &B256,
    ) -> Result<alloy_primitives::Signature, ExecutionError> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| ExecutionError::SigningFailed(e.to_string()))
    }

    /// ABI-encoded calldata for `fillOrder(order, signature)`.
    #[must_use]
    pub fn fill_order_calldata(order: Order, signature: &[u8]) -> Vec<u8> {
        fillOrderCall {
            order,
            signature: signature.to_vec().into(),
        }
        .abi_encode()
    }
}

/// Convert a decimal amount to integer base units, truncating dust.
fn to_base_units(amount: Decimal, decimals: u32) -> Result<U256, ExecutionError> {
    let scaled = amount * Decimal::from(10u128.pow(decimals));
    let units = scaled
        .trunc()
        .to_u128()
        .ok_or_else(|| ExecutionError::InvalidOrder(format!("amount out of range: {amount}")))?;
    Ok(U256::from(units))
}

/// Cryptographic-quality random 256-bit salt.
fn random_salt() -> U256 {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    U256::from_be_bytes(bytes)
}
