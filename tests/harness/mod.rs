//! Shared test harness: scripted feed streams, a fake chain client,
//! and book/signal builders.

#![allow(dead_code)]

use std::collections::VecDeque;

use alloy_primitives::{keccak256, Address, Bytes, B256};
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use evenmoney::core::chain::{ChainClient, TxReceipt};
use evenmoney::core::domain::{
    MarketId, OrderBook, PriceLevel, Signal, SignalHeader, SignalLeg, TokenId,
};
use evenmoney::core::feed::{MarketDataStream, MarketEvent};
use evenmoney::core::telemetry::now_ms;
use evenmoney::error::{Error, Result};

/// Build a book with only an ask side.
pub fn ask_book(token: &str, asks: &[(Decimal, Decimal)]) -> OrderBook {
    OrderBook::with_levels(
        TokenId::from(token),
        vec![],
        asks.iter().map(|(p, s)| PriceLevel::new(*p, *s)).collect(),
    )
}

/// A snapshot event for a book with only asks.
pub fn snapshot_event(token: &str, asks: &[(Decimal, Decimal)]) -> MarketEvent {
    MarketEvent::Snapshot {
        token_id: TokenId::from(token),
        bids: vec![],
        asks: asks.iter().map(|(p, s)| PriceLevel::new(*p, *s)).collect(),
        sequence: None,
        received_ms: now_ms(),
    }
}

/// An atomic YES/NO signal with numeric token ids (live-signable).
pub fn atomic_signal(trade_size: Decimal, expected_profit: Decimal) -> Signal {
    Signal::Atomic {
        header: SignalHeader::new("atomic", "trace-itest-1", trade_size, expected_profit, 1.0),
        market_id: MarketId::from("m1"),
        legs: vec![
            SignalLeg::buy(TokenId::from("101"), dec!(4.8), dec!(0.48)),
            SignalLeg::buy(TokenId::from("102"), dec!(5.0), dec!(0.50)),
        ],
    }
}

/// Pre-loaded stream: pops scripted events, then ends.
pub struct ScriptedStream {
    events: Mutex<VecDeque<MarketEvent>>,
}

impl ScriptedStream {
    pub fn new(events: Vec<MarketEvent>) -> Self {
        Self {
            events: Mutex::new(events.into()),
        }
    }
}

#[async_trait]
impl MarketDataStream for ScriptedStream {
    async fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&mut self, _token_ids: &[TokenId]) -> Result<()> {
        Ok(())
    }

    async fn unsubscribe(&mut self, _token_ids: &[TokenId]) -> Result<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        self.events.lock().pop_front()
    }

    fn exchange_name(&self) -> &'static str {
        "scripted"
    }
}

/// How the fake chain resolves receipts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    /// Every transaction mines successfully.
    Confirm,
    /// Every transaction mines and reverts.
    Revert,
    /// Nothing ever mines.
    NeverMine,
}

/// Scripted chain client recording everything it is asked to do.
pub struct FakeChainClient {
    pub balance: Mutex<Decimal>,
    pub allowance: Mutex<Decimal>,
    pub base_fee: u128,
    pub gas_estimate: u64,
    pub nonce_start: u64,
    pub receipt_mode: Mutex<ReceiptMode>,
    /// Error strings popped per send; empty entries mean success.
    pub send_errors: Mutex<VecDeque<Option<String>>>,
    /// Raw transactions accepted for broadcast.
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl FakeChainClient {
    pub fn new() -> Self {
        Self {
            balance: Mutex::new(dec!(1000)),
            allowance: Mutex::new(dec!(1000)),
            base_fee: 30_000_000_000,
            gas_estimate: 100_000,
            nonce_start: 0,
            receipt_mode: Mutex::new(ReceiptMode::Confirm),
            send_errors: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_allowance(self, allowance: Decimal) -> Self {
        *self.allowance.lock() = allowance;
        self
    }

    pub fn with_receipt_mode(self, mode: ReceiptMode) -> Self {
        *self.receipt_mode.lock() = mode;
        self
    }

    /// Queue the outcome of upcoming sends: `None` succeeds, `Some`
    /// fails with that message.
    pub fn queue_send_results(&self, results: Vec<Option<&str>>) {
        let mut queue = self.send_errors.lock();
        for result in results {
            queue.push_back(result.map(ToString::to_string));
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl ChainClient for FakeChainClient {
    async fn usdc_balance(&self, _owner: Address) -> Result<Decimal> {
        Ok(*self.balance.lock())
    }

    async fn usdc_allowance(&self, _owner: Address, _spender: Address) -> Result<Decimal> {
        Ok(*self.allowance.lock())
    }

    async fn estimate_gas(&self, _from: Address, _to: Address, _data: &Bytes) -> Result<u64> {
        Ok(self.gas_estimate)
    }

    async fn latest_base_fee(&self) -> Result<u128> {
        Ok(self.base_fee)
    }

    async fn transaction_count(&self, _address: Address) -> Result<u64> {
        Ok(self.nonce_start)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        if let Some(Some(message)) = self.send_errors.lock().pop_front() {
            return Err(Error::Rpc(message));
        }
        self.sent.lock().push(raw.to_vec());
        Ok(keccak256(raw))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>> {
        match *self.receipt_mode.lock() {
            ReceiptMode::Confirm => Ok(Some(TxReceipt {
                tx_hash: hash,
                success: true,
                gas_used: 90_000,
                effective_gas_price: self.base_fee,
            })),
            ReceiptMode::Revert => Ok(Some(TxReceipt {
                tx_hash: hash,
                success: false,
                gas_used: 90_000,
                effective_gas_price: self.base_fee,
            })),
            ReceiptMode::NeverMine => Ok(None),
        }
    }
}
