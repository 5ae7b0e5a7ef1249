//! Engine: wires the pipeline and runs the detection loop.
//!
//! One book update drives one detection cycle under a fresh trace id:
//! feed event -> book cache -> anomaly guard -> detector -> risk gate
//! -> execution router -> PnL. Executions are awaited inline, so the
//! loop itself is the backpressure boundary and shutdown has no
//! orphaned work once the loop exits.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::app::config::{Config, ExecutionMode};
use crate::core::book::BookCache;
use crate::core::chain::{ChainClient, OrderSigner, RpcClient};
use crate::core::domain::{Basket, BasketRegistry, OrderBook, Signal};
use crate::core::execution::{
    CircuitBreaker, ExecutionRouter, ExecutionStats, IdempotencyKeys, LiveExecutor, NonceManager,
    PnLSummary, PnLTracker, RetryPolicy, SimulatedExecutor,
};
use crate::core::feed::{FingerprintCache, MarketDataStream, MarketEvent, ReconnectingStream};
use crate::core::risk::{AnomalyGuard, ResponseAction, RiskInputs, RiskManager};
use crate::core::strategy::{AtomicArbitrage, MultiOutcomeArbitrage};
use crate::core::telemetry::{
    generate_trace_id, now_ms, with_trace, EventLog, EventType, LatencyStages, LatencyWindow,
};
use crate::error::{Error, Result};

/// The assembled trading core.
pub struct Engine {
    config: Config,
    registry: Arc<BasketRegistry>,
    cache: Arc<BookCache>,
    guard: Arc<AnomalyGuard>,
    risk: Arc<RiskManager>,
    router: Arc<ExecutionRouter>,
    pnl: Arc<PnLTracker>,
    latency: Arc<LatencyWindow>,
    event_log: Arc<EventLog>,
    dedup: Arc<FingerprintCache>,
    atomic: AtomicArbitrage,
    multi_outcome: MultiOutcomeArbitrage,
    chain: Option<Arc<dyn ChainClient>>,
    sender: Option<alloy_primitives::Address>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    /// Assemble the engine from configuration.
    ///
    /// In live mode this builds an RPC chain client from
    /// `chain.rpc_url`; use [`Self::with_chain_client`] to inject a
    /// different transport.
    pub fn new(config: Config, registry: BasketRegistry) -> Result<Self> {
        config.validate()?;
        let chain: Option<Arc<dyn ChainClient>> = match config.mode {
            ExecutionMode::Live => Some(Arc::new(RpcClient::new(config.chain.rpc_url.clone()))),
            ExecutionMode::DryRun => None,
        };
        Self::assemble(config, registry, chain)
    }

    /// Assemble the engine with an injected chain client.
    pub fn with_chain_client(
        config: Config,
        registry: BasketRegistry,
        chain: Arc<dyn ChainClient>,
    ) -> Result<Self> {
        config.validate()?;
        Self::assemble(config, registry, Some(chain))
    }

    fn assemble(
        config: Config,
        registry: BasketRegistry,
        chain: Option<Arc<dyn ChainClient>>,
    ) -> Result<Self> {
        let event_log = Arc::new(EventLog::to_file(&config.telemetry.events_path)?);
        let breaker = Arc::new(
            CircuitBreaker::new("execution", config.breaker.clone())
                .with_event_log(event_log.clone()),
        );
        let guard = Arc::new(
            AnomalyGuard::new(config.anomaly.clone())
                .with_breaker(breaker.clone())
                .with_event_log(event_log.clone()),
        );
        let risk = Arc::new(
            RiskManager::new(config.risk.clone()).with_event_log(event_log.clone()),
        );
        let pnl = Arc::new(PnLTracker::new().with_event_log(event_log.clone()));
        let idempotency = IdempotencyKeys::new(std::time::Duration::from_secs(
            config.idempotency_ttl_secs(),
        ));
        let simulated = SimulatedExecutor::new(config.simulated_executor.clone());

        let (router, sender) = match config.mode {
            ExecutionMode::DryRun => (
                ExecutionRouter::dry_run(
                    simulated,
                    breaker.clone(),
                    idempotency,
                    pnl.clone(),
                    config.max_in_flight(),
                ),
                None,
            ),
            ExecutionMode::Live => {
                let chain = chain
                    .clone()
                    .ok_or_else(|| Error::Config("live mode requires a chain client".into()))?;
                let key = config
                    .chain
                    .private_key
                    .as_deref()
                    .ok_or_else(|| Error::Config("live mode requires chain.private_key".into()))?;
                let signer = OrderSigner::new(key)?;
                let sender = signer.address();
                let live = LiveExecutor::new(
                    config.live_executor.clone(),
                    signer,
                    chain,
                    Arc::new(NonceManager::new()),
                    RetryPolicy::new(config.retry.clone()),
                )
                .with_event_log(event_log.clone());
                (
                    ExecutionRouter::live(
                        simulated,
                        live,
                        breaker.clone(),
                        idempotency,
                        pnl.clone(),
                        config.max_in_flight(),
                    ),
                    Some(sender),
                )
            }
        };
        let router = Arc::new(router.with_event_log(event_log.clone()));

        let latency = Arc::new(LatencyWindow::new(std::time::Duration::from_secs(
            config.telemetry.latency_window_secs,
        )));
        let dedup = Arc::new(FingerprintCache::new(config.feed.dedup_capacity));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            atomic: AtomicArbitrage::new(config.trading.trade_size),
            multi_outcome: MultiOutcomeArbitrage::new(config.trading.basket_units),
            config,
            registry: Arc::new(registry),
            cache: Arc::new(BookCache::new()),
            guard,
            risk,
            router,
            pnl,
            latency,
            event_log,
            dedup,
            chain,
            sender,
            shutdown_tx,
        })
    }

    /// The wire-level deduplicator, for attaching to a feed stream.
    #[must_use]
    pub fn dedup(&self) -> Arc<FingerprintCache> {
        self.dedup.clone()
    }

    /// The book cache.
    #[must_use]
    pub fn cache(&self) -> Arc<BookCache> {
        self.cache.clone()
    }

    /// Execution statistics snapshot.
    #[must_use]
    pub fn execution_stats(&self) -> ExecutionStats {
        self.router.stats()
    }

    /// PnL ledger summary.
    #[must_use]
    pub fn pnl_summary(&self) -> PnLSummary {
        self.pnl.summary()
    }

    /// End-to-end latency summary over the sliding window.
    #[must_use]
    pub fn latency_summary(&self) -> Option<crate::core::telemetry::LatencySummary> {
        self.latency.summary()
    }

    /// Signal the run loop to stop: the feed is cancelled, no new
    /// detection cycles start, and buffers are flushed on exit.
    pub fn shutdown(&self) {
        info!("Shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Run against the configured WebSocket feed with wire-level
    /// deduplication attached.
    pub async fn run_with_ws(&self) -> Result<()> {
        let stream = crate::core::feed::WsDataStream::new(self.config.feed.ws_url.clone())
            .with_dedup(self.dedup.clone());
        self.run(stream).await
    }

    /// Run the detection loop over a market data stream until the
    /// stream ends or shutdown is signalled.
    pub async fn run<S: MarketDataStream>(&self, stream: S) -> Result<()> {
        let mut stream =
            ReconnectingStream::new(stream, self.config.feed.reconnection.clone());
        stream.connect().await?;
        stream.subscribe(&self.registry.subscription_tokens()).await?;

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!(
            baskets = self.registry.len(),
            mode = ?self.config.mode,
            "Engine running"
        );

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                event = stream.next_event() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            warn!("Feed stream ended");
                            break;
                        }
                    }
                }
            }
        }

        // Executions are awaited inline by the loop, so nothing is in
        // flight here; flushing the sinks completes the shutdown.
        self.event_log.flush();
        info!("Engine stopped");
        Ok(())
    }

    async fn handle_event(&self, event: MarketEvent) {
        let (token_id, received_ms) = match event {
            MarketEvent::Snapshot {
                token_id,
                bids,
                asks,
                sequence,
                received_ms,
            } => {
                self.cache
                    .apply_snapshot(token_id.clone(), bids, asks, received_ms, sequence);
                (token_id, received_ms)
            }
            MarketEvent::Update {
                token_id,
                bid_deltas,
                ask_deltas,
                sequence,
                received_ms,
            } => {
                self.cache
                    .apply_update(&token_id, &bid_deltas, &ask_deltas, received_ms, sequence);
                (token_id, received_ms)
            }
            MarketEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Feed reported disconnect");
                return;
            }
        };
        let applied_ms = now_ms();

        if let Some(book) = self.cache.get(&token_id) {
            self.guard.observe(&book);
        }

        let Some(basket) = self.registry.basket_for_token(&token_id) else {
            debug!(token_id = %token_id, "Update for untracked token");
            return;
        };
        let basket = basket.clone();

        let trace_id = generate_trace_id();
        self.event_log.emit(
            EventType::EventReceived,
            serde_json::json!({
                "token_id": token_id.as_str(),
                "market_id": basket.market_id().as_str(),
            }),
            Some(&trace_id),
        );

        let feed_to_book_ms = (applied_ms - received_ms).max(0) as f64;
        with_trace(trace_id.clone(), async {
            self.detection_cycle(&basket, &trace_id, feed_to_book_ms)
                .await;
        })
        .await;
    }

    async fn detection_cycle(&self, basket: &Basket, trace_id: &str, feed_to_book_ms: f64) {
        let cycle_start = Instant::now();

        // Anomaly posture across every token in the basket: the worst
        // response wins.
        let mut action = ResponseAction::None;
        for token in basket.token_ids() {
            action = match (action, self.guard.action_for(token)) {
                (_, ResponseAction::Halt) | (ResponseAction::Halt, _) => ResponseAction::Halt,
                (_, ResponseAction::Degrade) | (ResponseAction::Degrade, _) => {
                    ResponseAction::Degrade
                }
                _ => ResponseAction::None,
            };
        }
        if action == ResponseAction::Halt {
            debug!(market_id = %basket.market_id(), "Basket halted by anomaly guard");
            return;
        }
        let size_factor = self.guard.size_factor(action);

        let Some((signal, books)) = self.detect(basket, trace_id, size_factor) else {
            return;
        };
        let book_to_signal_ms = cycle_start.elapsed().as_secs_f64() * 1000.0;

        self.event_log.emit(
            EventType::OpportunityDetected,
            serde_json::json!({
                "strategy": signal.header().strategy(),
                "market_id": signal.market_id().as_str(),
                "expected_profit": signal.header().expected_profit().to_string(),
                "trade_size": signal.header().trade_size().to_string(),
            }),
            Some(trace_id),
        );

        let risk_start = Instant::now();
        let inputs = match self.risk_inputs(&signal).await {
            Ok(inputs) => inputs,
            Err(e) => {
                warn!(error = %e, "Failed to gather risk inputs");
                return;
            }
        };
        let edge = self.risk.gate(&signal, inputs);
        let signal_to_risk_ms = risk_start.elapsed().as_secs_f64() * 1000.0;
        if !edge.is_accept() {
            return;
        }

        let send_start = Instant::now();
        match self.router.execute(&signal, &books).await {
            Ok(outcome) => {
                debug!(
                    fills = outcome.fills.len(),
                    complete = outcome.is_complete(),
                    "Cycle executed"
                );
            }
            Err(e) => {
                debug!(error = %e, "Execution refused");
            }
        }
        let risk_to_send_ms = send_start.elapsed().as_secs_f64() * 1000.0;

        self.latency.record(LatencyStages {
            feed_to_book_ms,
            book_to_signal_ms,
            signal_to_risk_ms,
            risk_to_send_ms,
        });
    }

    fn detect(
        &self,
        basket: &Basket,
        trace_id: &str,
        size_factor: Decimal,
    ) -> Option<(Signal, Vec<OrderBook>)> {
        match basket {
            Basket::Binary {
                market_id,
                yes_token,
                no_token,
                ..
            } => {
                let (yes_book, no_book) = self.cache.get_pair(yes_token, no_token);
                let (yes_book, no_book) = (yes_book?, no_book?);
                let detector = if size_factor == Decimal::ONE {
                    self.atomic.clone()
                } else {
                    AtomicArbitrage::new(self.atomic.trade_size() * size_factor)
                };
                let signal = detector.detect(market_id, &yes_book, &no_book, trace_id)?;
                Some((signal, vec![yes_book, no_book]))
            }
            Basket::MultiOutcome {
                market_id,
                token_ids,
                ..
            } => {
                let books: Option<Vec<OrderBook>> =
                    self.cache.get_many(token_ids).into_iter().collect();
                let books = books?;
                let detector = if size_factor == Decimal::ONE {
                    self.multi_outcome.clone()
                } else {
                    MultiOutcomeArbitrage::new(self.multi_outcome.units() * size_factor)
                };
                let signal = detector.detect(market_id, &books, trace_id)?;
                Some((signal, books))
            }
        }
    }

    async fn risk_inputs(&self, signal: &Signal) -> Result<RiskInputs> {
        let balance = match (&self.chain, self.sender) {
            (Some(chain), Some(sender)) => chain.usdc_balance(sender).await?,
            _ => self.config.trading.dry_run_balance,
        };

        let total_cost = signal.total_cost();
        let fees = total_cost * self.config.trading.fee_rate;
        let slippage = total_cost
            * Decimal::from(self.config.simulated_executor.slippage_bps)
            / Decimal::from(10_000);

        Ok(RiskInputs {
            balance,
            gas_cost: self.config.trading.gas_estimate,
            fees,
            slippage,
        })
    }
}
