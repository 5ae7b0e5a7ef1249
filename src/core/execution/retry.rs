//! Retry policy with exponential backoff and jitter.
//!
//! Errors are classified retryable by message pattern, mirroring the
//! strings surfaced by RPC providers. Non-retryable errors stop
//! immediately. The `execute` future is cancellation-safe: dropping it
//! (task cancellation) abandons the in-flight attempt and schedules no
//! further retries.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{error, warn};

use crate::error::Error;

/// Message patterns that mark an error as transient.
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "network",
    "connection",
    "nonce too low",
    "replacement transaction underpriced",
    "gas required exceeds allowance",
];

/// Retry tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_exponential_backoff")]
    pub exponential_backoff: bool,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_exponential_backoff() -> bool {
    true
}

fn default_jitter() -> bool {
    true
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_backoff: default_exponential_backoff(),
            jitter: default_jitter(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Retry policy with exponential backoff and jitter.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a policy with the given config.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Configured tuning.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether an error should be retried.
    #[must_use]
    pub fn is_retryable(error: &Error) -> bool {
        let message = error.to_string().to_lowercase();
        RETRYABLE_PATTERNS.iter().any(|p| message.contains(p))
    }

    /// Delay before the retry following `attempt` (0-indexed).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay_ms as f64;
        let mut delay_ms = if self.config.exponential_backoff {
            base * self.config.backoff_multiplier.powi(attempt as i32)
        } else {
            base
        };
        delay_ms = delay_ms.min(self.config.max_delay_ms as f64);

        if self.config.jitter {
            // +/- 10% to avoid thundering herds on shared infrastructure.
            let factor = rand::thread_rng().gen_range(0.9..=1.1);
            delay_ms *= factor;
        }

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Run `f` up to `max_retries + 1` times, sleeping between attempts.
    ///
    /// `f` receives the attempt index. The `on_retry` hook is called
    /// with the error and attempt before each sleep.
    pub async fn execute<T, F, Fut>(
        &self,
        mut f: F,
        mut on_retry: impl FnMut(&Error, u32),
    ) -> Result<T, Error>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempt = 0;
        loop {
            match f(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let retryable = Self::is_retryable(&e);
                    if attempt < self.config.max_retries && retryable {
                        let delay = self.delay(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max = self.config.max_retries,
                            delay_ms = delay.as_millis(),
                            error = %e,
                            "Retrying after delay"
                        );
                        on_retry(&e, attempt);
                        sleep(delay).await;
                        attempt += 1;
                    } else {
                        if retryable {
                            error!(error = %e, "Max retries exceeded");
                        } else {
                            error!(error = %e, "Non-retryable error");
                        }
                        return Err(e);
                    }
                }
            }
        }
    }
}
