//! Unified execution router for dry-run and live modes.
//!
//! One entry point per accepted signal. The router coordinates the
//! safety plumbing around whichever executor handles the mode: bounded
//! admission (backpressure), idempotency suppression, circuit-breaker
//! gating, outcome recording, and the PnL update. Both modes produce
//! the same `Fill` shape, so everything downstream is monomorphic.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::breaker::{CallOutcome, CircuitBreaker};
use super::idempotency::IdempotencyKeys;
use super::live::LiveExecutor;
use super::pnl::{PnLTracker, PnLUpdate};
use super::simulated::SimulatedExecutor;
use crate::core::domain::{Fill, OrderBook, Signal, TokenId};
use crate::core::telemetry::{EventLog, EventType};
use crate::error::{Error, ExecutionError, Result};

/// A leg that failed to execute.
#[derive(Debug, Clone)]
pub struct LegFailure {
    pub token_id: TokenId,
    pub error: String,
}

/// Result of routing one signal.
#[derive(Debug)]
pub struct ExecutionOutcome {
    pub fills: Vec<Fill>,
    pub failures: Vec<LegFailure>,
    /// Observed gas cost in native token (zero in dry-run).
    pub gas_cost: Decimal,
    pub pnl: PnLUpdate,
}

impl ExecutionOutcome {
    /// True iff every leg filled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && !self.fills.is_empty()
    }
}

/// Router statistics snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionStats {
    pub total: u64,
    pub complete: u64,
    pub partial: u64,
    pub failed: u64,
    pub breaker_rejections: u64,
    pub duplicate_rejections: u64,
    pub capacity_rejections: u64,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    complete: AtomicU64,
    partial: AtomicU64,
    failed: AtomicU64,
    breaker_rejections: AtomicU64,
    duplicate_rejections: AtomicU64,
    capacity_rejections: AtomicU64,
}

/// Routes accepted signals to the simulated or live executor.
pub struct ExecutionRouter {
    dry_run: bool,
    simulated: SimulatedExecutor,
    live: Option<LiveExecutor>,
    breaker: Arc<CircuitBreaker>,
    idempotency: IdempotencyKeys,
    pnl: Arc<PnLTracker>,
    max_in_flight: usize,
    in_flight: AtomicUsize,
    counters: Counters,
    event_log: Option<Arc<EventLog>>,
}

impl ExecutionRouter {
    /// Create a dry-run router.
    pub fn dry_run(
        simulated: SimulatedExecutor,
        breaker: Arc<CircuitBreaker>,
        idempotency: IdempotencyKeys,
        pnl: Arc<PnLTracker>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            dry_run: true,
            simulated,
            live: None,
            breaker,
            idempotency,
            pnl,
            max_in_flight,
            in_flight: AtomicUsize::new(0),
            counters: Counters::default(),
            event_log: None,
        }
    }

    /// Create a live router. The simulated executor stays available
    /// for shadow pricing.
    pub fn live(
        simulated: SimulatedExecutor,
        live: LiveExecutor,
        breaker: Arc<CircuitBreaker>,
        idempotency: IdempotencyKeys,
        pnl: Arc<PnLTracker>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            dry_run: false,
            simulated,
            live: Some(live),
            breaker,
            idempotency,
            pnl,
            max_in_flight,
            in_flight: AtomicUsize::new(0),
            counters: Counters::default(),
            event_log: None,
        }
    }

    /// Attach a telemetry sink.
    #[must_use]
    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Whether the router is in dry-run mode.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Execute an accepted signal against the books it was derived
    /// from.
    ///
    /// Safety refusals (capacity, duplicate, open breaker) return
    /// typed errors without side effects. Execution failures are
    /// recorded into the breaker and, for partial baskets, still
    /// produce a PnL update covering the filled legs.
    pub async fn execute(&self, signal: &Signal, books: &[OrderBook]) -> Result<ExecutionOutcome> {
        // Admission fast path: reject rather than queue unboundedly.
        let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel);
        let _guard = InFlightGuard(&self.in_flight);
        if in_flight >= self.max_in_flight {
            self.counters
                .capacity_rejections
                .fetch_add(1, Ordering::Relaxed);
            warn!(in_flight, "Execution capacity exhausted");
            return Err(ExecutionError::CapacityExhausted { in_flight }.into());
        }

        if let Err(e) = self.breaker.admit() {
            self.counters
                .breaker_rejections
                .fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }

        let key = IdempotencyKeys::key_for(signal);
        if !self.idempotency.check_and_set(&key) {
            self.counters
                .duplicate_rejections
                .fetch_add(1, Ordering::Relaxed);
            // The admitted breaker call never ran; balance the books
            // with a success so suppression is not counted as failure.
            self.breaker.record(CallOutcome::success(0.0));
            return Err(ExecutionError::DuplicateSignal { key }.into());
        }

        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let (fills, failures, gas_cost) = if self.dry_run {
            match self.simulated.execute_signal(signal, books) {
                Ok(fills) => (fills, Vec::new(), Decimal::ZERO),
                Err(e) => {
                    // All-or-nothing in simulation: no partial fills.
                    let failures = vec![LegFailure {
                        token_id: signal.primary_token().clone(),
                        error: e.to_string(),
                    }];
                    (Vec::new(), failures, Decimal::ZERO)
                }
            }
        } else {
            let live = self.live.as_ref().ok_or_else(|| {
                Error::Config("live mode requested without a live executor".into())
            })?;
            match live.execute_signal(signal).await {
                Ok(outcome) => (outcome.fills, outcome.failures, outcome.gas_cost),
                Err(e) => {
                    // Preflight refusals abort the basket before any leg.
                    let failures = vec![LegFailure {
                        token_id: signal.primary_token().clone(),
                        error: e.to_string(),
                    }];
                    (Vec::new(), failures, Decimal::ZERO)
                }
            }
        };

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let success = failures.is_empty() && !fills.is_empty();
        self.breaker.record(CallOutcome {
            success,
            gas_cost,
            execution_ms: elapsed_ms,
        });

        if success {
            self.counters.complete.fetch_add(1, Ordering::Relaxed);
        } else if fills.is_empty() {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.partial.fetch_add(1, Ordering::Relaxed);
            warn!(
                fills = fills.len(),
                failures = failures.len(),
                "Partial basket: unhedged position reported"
            );
        }

        for failure in &failures {
            if let Some(log) = &self.event_log {
                log.emit(
                    EventType::ExecutionFailed,
                    serde_json::json!({
                        "token_id": failure.token_id.as_str(),
                        "error": failure.error,
                        "strategy": signal.header().strategy(),
                    }),
                    Some(signal.header().trace_id()),
                );
            }
        }

        let pnl = self.pnl.process_fills(
            &fills,
            signal.header().expected_profit(),
            signal.header().trace_id(),
            signal.header().strategy(),
        );

        info!(
            strategy = signal.header().strategy(),
            fills = fills.len(),
            failures = failures.len(),
            elapsed_ms,
            "Execution routed"
        );

        Ok(ExecutionOutcome {
            fills,
            failures,
            gas_cost,
            pnl,
        })
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            total: self.counters.total.load(Ordering::Relaxed),
            complete: self.counters.complete.load(Ordering::Relaxed),
            partial: self.counters.partial.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            breaker_rejections: self.counters.breaker_rejections.load(Ordering::Relaxed),
            duplicate_rejections: self.counters.duplicate_rejections.load(Ordering::Relaxed),
            capacity_rejections: self.counters.capacity_rejections.load(Ordering::Relaxed),
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
