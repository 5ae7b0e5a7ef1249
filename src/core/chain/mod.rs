//! Chain access: JSON-RPC client and order signing.

mod client;
mod rpc;
mod signer;

pub use client::{ChainClient, FeeEnvelope, TxReceipt};
pub use rpc::RpcClient;
pub use signer::{Order, OrderSigner};

use alloy_primitives::{address, Address};

/// Chain ID of the Polygon PoS network the exchange lives on.
pub const CHAIN_ID: u64 = 137;

/// CTF Exchange contract on Polygon.
pub const EXCHANGE_ADDRESS: Address = address!("0x4bFb41dcdDBA6F0a3232F775EeaC3FD7dFa6477d");

/// Native USDC on Polygon. The exchange settles in this token only.
pub const USDC_ADDRESS: Address = address!("0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174");

/// USDC base unit scale (6 decimals).
pub const USDC_DECIMALS: u32 = 6;

/// Outcome token base unit scale (18 decimals).
pub const TOKEN_DECIMALS: u32 = 18;
