//! Execution pipeline: resilience plumbing, executors, and PnL.

mod breaker;
mod idempotency;
mod live;
mod nonce;
mod pnl;
mod retry;
mod router;
mod simulated;

pub use breaker::{CallOutcome, CircuitBreaker, CircuitBreakerConfig, CircuitState, CircuitStats};
pub use idempotency::IdempotencyKeys;
pub use live::{LiveExecutor, LiveExecutorConfig, LiveOutcome};
pub use nonce::{NonceManager, NonceStats, NonceStatus};
pub use pnl::{PnLSummary, PnLTracker, PnLUpdate};
pub use retry::{RetryConfig, RetryPolicy};
pub use router::{ExecutionOutcome, ExecutionRouter, ExecutionStats, LegFailure};
pub use simulated::{SimulatedExecutor, SimulatedExecutorConfig};
