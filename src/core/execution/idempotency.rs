//! Time-bounded idempotency key set.
//!
//! Logically identical signals within the TTL window collapse to one
//! execution. Keys combine strategy name, primary token, and signal
//! kind so re-detections of the same opportunity are suppressed while
//! genuinely new opportunities pass.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::core::domain::Signal;

/// Keyed set with time-to-live and lazy eviction.
pub struct IdempotencyKeys {
    ttl: Duration,
    keys: Mutex<HashMap<String, Instant>>,
}

impl IdempotencyKeys {
    /// Create a key set with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Derive the idempotency key for a signal.
    #[must_use]
    pub fn key_for(signal: &Signal) -> String {
        format!(
            "{}:{}:{}",
            signal.header().strategy(),
            signal.primary_token(),
            signal.kind()
        )
    }

    /// Record `key` if unseen within the TTL.
    ///
    /// Returns `true` iff the key was newly created (the operation
    /// should proceed). Expired keys are evicted on every call.
    pub fn check_and_set(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut keys = self.keys.lock();

        keys.retain(|_, expiry| *expiry > now);

        if keys.contains_key(key) {
            warn!(key, "Duplicate operation suppressed");
            return false;
        }

        keys.insert(key.to_string(), now + self.ttl);
        true
    }

    /// Remove a key early, allowing immediate re-execution.
    pub fn remove(&self, key: &str) {
        self.keys.lock().remove(key);
    }

    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.lock().len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for IdempotencyKeys {
    fn default() -> Self {
        Self::new(Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{MarketId, SignalHeader, SignalLeg, TokenId};
    use rust_decimal_macros::dec;

    #[test]
    fn first_set_succeeds_second_fails() {
        let keys = IdempotencyKeys::default();
        assert!(keys.check_and_set("k1"));
        assert!(!keys.check_and_set("k1"));
    }

    #[test]
    fn distinct_keys_are_independent() {
        let keys = IdempotencyKeys::default();
        assert!(keys.check_and_set("k1"));
        assert!(keys.check_and_set("k2"));
    }

    #[test]
    fn expired_keys_are_evicted_on_check() {
        let keys = IdempotencyKeys::new(Duration::from_millis(0));
        assert!(keys.check_and_set("k1"));
        std::thread::sleep(Duration::from_millis(2));
        assert!(keys.check_and_set("k1"));
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn remove_allows_immediate_reuse() {
        let keys = IdempotencyKeys::default();
        assert!(keys.check_and_set("k1"));
        keys.remove("k1");
        assert!(keys.check_and_set("k1"));
    }

    #[test]
    fn key_formula_combines_strategy_token_kind() {
        let signal = Signal::Atomic {
            header: SignalHeader::new("atomic", "trace-1", dec!(10), dec!(0.2), 1.0),
            market_id: MarketId::from("m1"),
            legs: vec![
                SignalLeg::buy(TokenId::from("yes-tok"), dec!(5), dec!(0.5)),
                SignalLeg::buy(TokenId::from("no-tok"), dec!(5), dec!(0.5)),
            ],
        };
        assert_eq!(
            IdempotencyKeys::key_for(&signal),
            "atomic:yes-tok:atomic_arbitrage"
        );
    }
}
