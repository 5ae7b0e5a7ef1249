//! Circuit breaker for execution resilience.
//!
//! CLOSED passes calls through while recording outcomes. The circuit
//! trips OPEN on consecutive failures, on a windowed failure rate, or
//! on a single excessive gas cost. After the open timeout the next call
//! is admitted in HALF_OPEN; a full quota of clean trial calls closes
//! the circuit, any trial failure reopens it. While OPEN, the protected
//! function is never invoked.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::telemetry::{EventLog, EventType};
use crate::error::ExecutionError;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Tripped; calls are refused without invoking the function.
    Open,
    /// Probing recovery with a bounded trial quota.
    HalfOpen,
}

impl CircuitState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_consecutive_failures_threshold")]
    pub consecutive_failures_threshold: u32,
    /// Failure rate over the monitoring window that trips the circuit.
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    /// A single call costing more gas than this trips the circuit.
    #[serde(default = "default_gas_cost_threshold")]
    pub gas_cost_threshold: Decimal,
    #[serde(default = "default_open_timeout_seconds")]
    pub open_timeout_seconds: u64,
    #[serde(default = "default_half_open_max_calls")]
    pub half_open_max_calls: u32,
    #[serde(default = "default_monitoring_window_seconds")]
    pub monitoring_window_seconds: u64,
}

fn default_consecutive_failures_threshold() -> u32 {
    5
}

fn default_failure_rate_threshold() -> f64 {
    0.5
}

fn default_gas_cost_threshold() -> Decimal {
    Decimal::TWO
}

fn default_open_timeout_seconds() -> u64 {
    60
}

fn default_half_open_max_calls() -> u32 {
    3
}

fn default_monitoring_window_seconds() -> u64 {
    300
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_failures_threshold: default_consecutive_failures_threshold(),
            failure_rate_threshold: default_failure_rate_threshold(),
            gas_cost_threshold: default_gas_cost_threshold(),
            open_timeout_seconds: default_open_timeout_seconds(),
            half_open_max_calls: default_half_open_max_calls(),
            monitoring_window_seconds: default_monitoring_window_seconds(),
        }
    }
}

/// Outcome of one call through the breaker.
#[derive(Debug, Clone, Copy)]
pub struct CallOutcome {
    pub success: bool,
    pub gas_cost: Decimal,
    pub execution_ms: f64,
}

impl CallOutcome {
    /// A plain success with no gas attribution.
    #[must_use]
    pub fn success(execution_ms: f64) -> Self {
        Self {
            success: true,
            gas_cost: Decimal::ZERO,
            execution_ms,
        }
    }

    /// A plain failure with no gas attribution.
    #[must_use]
    pub fn failure(execution_ms: f64) -> Self {
        Self {
            success: false,
            gas_cost: Decimal::ZERO,
            execution_ms,
        }
    }
}

/// Breaker statistics snapshot.
#[derive(Debug, Clone)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_rate: f64,
    pub calls_in_window: usize,
    pub half_open_calls: u32,
}

struct Recorded {
    success: bool,
    at: Instant,
}

struct Inner {
    state: CircuitState,
    state_changed_at: Instant,
    consecutive_failures: u32,
    half_open_calls: u32,
    half_open_successes: u32,
    history: VecDeque<Recorded>,
}

/// Circuit breaker guarding the execution path.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
    event_log: Option<Arc<EventLog>>,
}

impl CircuitBreaker {
    /// Create a breaker with the given name and config.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                state_changed_at: Instant::now(),
                consecutive_failures: 0,
                half_open_calls: 0,
                half_open_successes: 0,
                history: VecDeque::new(),
            }),
            event_log: None,
        }
    }

    /// Attach a telemetry sink; state transitions are emitted to it.
    #[must_use]
    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Current state, applying any timed OPEN -> HALF_OPEN transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.check_timed_transition(&mut inner);
        inner.state
    }

    /// Admit or refuse a call. Must be paired with [`Self::record`].
    pub fn admit(&self) -> Result<(), ExecutionError> {
        let mut inner = self.inner.lock();
        self.check_timed_transition(&mut inner);

        match inner.state {
            CircuitState::Open => {
                warn!(breaker = %self.name, "Circuit open, refusing call");
                Err(ExecutionError::CircuitOpen {
                    name: self.name.clone(),
                })
            }
            CircuitState::HalfOpen => {
                if inner.half_open_calls >= self.config.half_open_max_calls {
                    // Trial quota exhausted but not yet resolved; hold
                    // further traffic until the in-flight trials record.
                    return Err(ExecutionError::CircuitOpen {
                        name: self.name.clone(),
                    });
                }
                inner.half_open_calls += 1;
                info!(
                    breaker = %self.name,
                    call = inner.half_open_calls,
                    quota = self.config.half_open_max_calls,
                    "Half-open trial call"
                );
                Ok(())
            }
            CircuitState::Closed => Ok(()),
        }
    }

    /// Record the outcome of an admitted call.
    pub fn record(&self, outcome: CallOutcome) {
        let mut inner = self.inner.lock();
        inner.history.push_back(Recorded {
            success: outcome.success,
            at: Instant::now(),
        });
        // Bounded history: trim to half once the cap is exceeded.
        if inner.history.len() > 1000 {
            while inner.history.len() > 500 {
                inner.history.pop_front();
            }
        }

        match inner.state {
            CircuitState::Closed => {
                if outcome.success {
                    inner.consecutive_failures = 0;
                } else {
                    inner.consecutive_failures += 1;
                }
                if self.should_trip(&inner, outcome) {
                    self.transition(&mut inner, CircuitState::Open, "threshold exceeded");
                }
            }
            CircuitState::HalfOpen => {
                if outcome.success {
                    inner.half_open_successes += 1;
                    if inner.half_open_successes >= self.config.half_open_max_calls {
                        self.transition(&mut inner, CircuitState::Closed, "trial quota succeeded");
                    }
                } else {
                    self.transition(&mut inner, CircuitState::Open, "trial call failed");
                }
            }
            CircuitState::Open => {
                // Late result from a call admitted before the trip.
                if !outcome.success {
                    inner.consecutive_failures += 1;
                }
            }
        }
    }

    /// Run `f` through the breaker, timing it and recording the
    /// outcome with no gas attribution. Callers that know gas costs
    /// use [`Self::admit`]/[`Self::record`] directly.
    pub async fn execute<T, E, F, Fut>(&self, f: F) -> Result<Result<T, E>, ExecutionError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.admit()?;
        let started = Instant::now();
        let result = f().await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        match &result {
            Ok(_) => self.record(CallOutcome::success(elapsed_ms)),
            Err(_) => self.record(CallOutcome::failure(elapsed_ms)),
        }
        Ok(result)
    }

    /// Failure rate over the monitoring window.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let inner = self.inner.lock();
        Self::windowed_failure_rate(&inner, self.config.monitoring_window_seconds)
    }

    /// Statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> CircuitStats {
        let mut inner = self.inner.lock();
        self.check_timed_transition(&mut inner);
        let window = self.config.monitoring_window_seconds;
        let cutoff = Duration::from_secs(window);
        let calls_in_window = inner
            .history
            .iter()
            .filter(|r| r.at.elapsed() <= cutoff)
            .count();
        CircuitStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            failure_rate: Self::windowed_failure_rate(&inner, window),
            calls_in_window,
            half_open_calls: inner.half_open_calls,
        }
    }

    /// Force the circuit OPEN. Used by guards that detect hostile
    /// market conditions out-of-band.
    pub fn trip(&self, reason: &str) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open, reason);
    }

    /// Reset to CLOSED, clearing history. For operator tooling.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.history.clear();
        inner.consecutive_failures = 0;
        inner.half_open_calls = 0;
        inner.half_open_successes = 0;
        self.transition(&mut inner, CircuitState::Closed, "manual reset");
    }

    fn should_trip(&self, inner: &Inner, outcome: CallOutcome) -> bool {
        if outcome.gas_cost > self.config.gas_cost_threshold {
            warn!(
                breaker = %self.name,
                gas_cost = %outcome.gas_cost,
                threshold = %self.config.gas_cost_threshold,
                "Gas cost threshold exceeded"
            );
            return true;
        }
        if inner.consecutive_failures >= self.config.consecutive_failures_threshold {
            warn!(
                breaker = %self.name,
                failures = inner.consecutive_failures,
                "Consecutive failure threshold exceeded"
            );
            return true;
        }
        let rate = Self::windowed_failure_rate(inner, self.config.monitoring_window_seconds);
        if rate >= self.config.failure_rate_threshold {
            warn!(
                breaker = %self.name,
                failure_rate = rate,
                "Failure rate threshold exceeded"
            );
            return true;
        }
        false
    }

    fn check_timed_transition(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open
            && inner.state_changed_at.elapsed()
                >= Duration::from_secs(self.config.open_timeout_seconds)
        {
            self.transition(inner, CircuitState::HalfOpen, "open timeout elapsed");
        }
    }

    fn transition(&self, inner: &mut Inner, new_state: CircuitState, reason: &str) {
        let old_state = inner.state;
        if old_state == new_state && new_state != CircuitState::Closed {
            return;
        }
        inner.state = new_state;
        inner.state_changed_at = Instant::now();

        match new_state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
                inner.half_open_calls = 0;
                inner.half_open_successes = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_calls = 0;
                inner.half_open_successes = 0;
            }
            CircuitState::Open => {}
        }

        info!(
            breaker = %self.name,
            from = old_state.as_str(),
            to = new_state.as_str(),
            reason,
            "Circuit state transition"
        );

        if let Some(log) = &self.event_log {
            log.emit(
                EventType::CircuitStateChange,
                serde_json::json!({
                    "breaker": self.name,
                    "from": old_state.as_str(),
                    "to": new_state.as_str(),
                    "reason": reason,
                    "consecutive_failures": inner.consecutive_failures,
                }),
                None,
            );
        }
    }

    fn windowed_failure_rate(inner: &Inner, window_seconds: u64) -> f64 {
        let cutoff = Duration::from_secs(window_seconds);
        let recent: Vec<&Recorded> = inner
            .history
            .iter()
            .filter(|r| r.at.elapsed() <= cutoff)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }
        let failures = recent.iter().filter(|r| !r.success).count();
        failures as f64 / recent.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config(consecutive: u32) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            consecutive_failures_threshold: consecutive,
            // Keep the rate trigger out of the way for state tests.
            failure_rate_threshold: 1.1,
            gas_cost_threshold: dec!(2.0),
            open_timeout_seconds: 0,
            half_open_max_calls: 3,
            monitoring_window_seconds: 300,
        }
    }

    fn fail(breaker: &CircuitBreaker) {
        breaker.admit().unwrap();
        breaker.record(CallOutcome::failure(1.0));
    }

    fn succeed(breaker: &CircuitBreaker) {
        breaker.admit().unwrap();
        breaker.record(CallOutcome::success(1.0));
    }

    #[test]
    fn trips_exactly_at_consecutive_threshold() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig {
            open_timeout_seconds: 3600,
            ..config(3)
        });

        fail(&breaker);
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);

        // The third failure trips on this failure, not the next.
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        // Refused without invoking anything.
        assert!(matches!(
            breaker.admit(),
            Err(ExecutionError::CircuitOpen { .. })
        ));
    }

    #[test]
    fn success_resets_consecutive_count() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig {
            open_timeout_seconds: 3600,
            ..config(3)
        });

        fail(&breaker);
        fail(&breaker);
        succeed(&breaker);
        fail(&breaker);
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn excessive_gas_trips_even_on_success() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig {
            open_timeout_seconds: 3600,
            ..config(5)
        });

        breaker.admit().unwrap();
        breaker.record(CallOutcome {
            success: true,
            gas_cost: dec!(2.5),
            execution_ms: 1.0,
        });
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn failure_rate_trips_circuit() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig {
            consecutive_failures_threshold: 100,
            failure_rate_threshold: 0.5,
            open_timeout_seconds: 3600,
            ..config(100)
        });

        succeed(&breaker);
        fail(&breaker);
        // 1 failure / 2 calls = 0.5 >= threshold.
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn open_transitions_to_half_open_after_timeout() {
        let breaker = CircuitBreaker::new("test", config(1));
        fail(&breaker);
        // open_timeout_seconds = 0: next inspection flips to half-open.
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_clean_trial_quota() {
        let breaker = CircuitBreaker::new("test", config(1));
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        succeed(&breaker);
        succeed(&breaker);
        succeed(&breaker);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().consecutive_failures, 0);
    }

    #[test]
    fn half_open_reopens_on_any_failure() {
        let breaker = CircuitBreaker::new("test", config(1));
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        succeed(&breaker);
        fail(&breaker);
        // The trial failure reopened the circuit; the zero open
        // timeout then admits a fresh probe with a reset quota.
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(breaker.stats().half_open_calls, 0);
    }

    #[tokio::test]
    async fn execute_refuses_while_open_without_invoking() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig {
            open_timeout_seconds: 3600,
            ..config(1)
        });
        fail(&breaker);

        let mut invoked = false;
        let result = breaker
            .execute(|| async {
                invoked = true;
                Ok::<_, ExecutionError>(1)
            })
            .await;

        assert!(matches!(result, Err(ExecutionError::CircuitOpen { .. })));
        assert!(!invoked);
    }

    #[tokio::test]
    async fn execute_records_outcomes() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig {
            open_timeout_seconds: 3600,
            ..config(2)
        });

        let ok = breaker
            .execute(|| async { Ok::<_, ExecutionError>(7) })
            .await
            .unwrap();
        assert_eq!(ok.unwrap(), 7);

        let _ = breaker
            .execute(|| async {
                Err::<u32, _>(ExecutionError::SubmissionFailed("boom".into()))
            })
            .await
            .unwrap();
        assert_eq!(breaker.stats().consecutive_failures, 1);
    }

    #[test]
    fn reset_returns_to_closed() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig {
            open_timeout_seconds: 3600,
            ..config(1)
        });
        fail(&breaker);
        assert_eq!(breaker.state(), CircuitState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.stats().calls_in_window, 0);
    }
}
