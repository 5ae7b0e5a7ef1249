//! Nonce management for on-chain transaction ordering.
//!
//! A sender address owns a monotonically increasing counter. Failed
//! allocations are handed back so the lowest free nonce is always used
//! next; confirmed nonces are never reused. A nonce may only be
//! released if its transaction failed before broadcast - anything the
//! chain saw has advanced the on-chain counter.

use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;
use tracing::debug;

use crate::core::telemetry::now_ms;
use crate::error::ExecutionError;

/// Status of one allocated nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NonceStatus {
    pub nonce: u64,
    pub in_use: bool,
    pub confirmed: bool,
    pub created_at_ms: i64,
}

/// Snapshot of the manager's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonceStats {
    pub next: Option<u64>,
    pub pending: Vec<u64>,
    pub confirmed_count: usize,
}

#[derive(Debug, Default)]
struct Inner {
    next: Option<u64>,
    pending: HashMap<u64, NonceStatus>,
    confirmed: BTreeSet<u64>,
}

/// Thread-safe per-sender nonce allocator.
///
/// All operations are O(1)-ish under one short mutex; no suspension
/// happens while it is held.
#[derive(Debug, Default)]
pub struct NonceManager {
    inner: Mutex<Inner>,
}

impl NonceManager {
    /// Create an uninitialized manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the counter from the on-chain transaction count.
    pub fn initialize(&self, on_chain_nonce: u64) {
        let mut inner = self.inner.lock();
        inner.next = Some(on_chain_nonce);
        debug!(next = on_chain_nonce, "Nonce manager initialized");
    }

    /// Allocate the next nonce and record it as pending.
    pub fn allocate(&self) -> Result<u64, ExecutionError> {
        let mut inner = self.inner.lock();
        let nonce = inner.next.ok_or(ExecutionError::NonceUninitialized)?;
        inner.next = Some(nonce + 1);
        inner.pending.insert(
            nonce,
            NonceStatus {
                nonce,
                in_use: true,
                confirmed: false,
                created_at_ms: now_ms(),
            },
        );
        debug!(nonce, "Allocated nonce");
        Ok(nonce)
    }

    /// Mark a nonce as confirmed on-chain. Confirmed nonces are never
    /// handed out again.
    pub fn mark_confirmed(&self, nonce: u64) {
        let mut inner = self.inner.lock();
        inner.pending.remove(&nonce);
        inner.confirmed.insert(nonce);
        debug!(nonce, "Nonce confirmed");
    }

    /// Release a nonce whose transaction failed before broadcast.
    ///
    /// Lowers `next` so the freed nonce is reused before later ones,
    /// preventing a permanent gap in the sender's sequence.
    pub fn mark_failed(&self, nonce: u64) {
        let mut inner = self.inner.lock();
        inner.pending.remove(&nonce);
        match inner.next {
            Some(next) if nonce < next => inner.next = Some(nonce),
            None => inner.next = Some(nonce),
            _ => {}
        }
        debug!(nonce, "Nonce released for reuse");
    }

    /// Whether a nonce is currently pending.
    #[must_use]
    pub fn is_pending(&self, nonce: u64) -> bool {
        self.inner.lock().pending.contains_key(&nonce)
    }

    /// Number of pending nonces.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Snapshot of the current bookkeeping.
    #[must_use]
    pub fn stats(&self) -> NonceStats {
        let inner = self.inner.lock();
        let mut pending: Vec<u64> = inner.pending.keys().copied().collect();
        pending.sort_unstable();
        NonceStats {
            next: inner.next,
            pending,
            confirmed_count: inner.confirmed.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_before_initialize_fails() {
        let manager = NonceManager::new();
        assert!(matches!(
            manager.allocate(),
            Err(ExecutionError::NonceUninitialized)
        ));
    }

    #[test]
    fn allocations_are_monotonic() {
        let manager = NonceManager::new();
        manager.initialize(7);

        assert_eq!(manager.allocate().unwrap(), 7);
        assert_eq!(manager.allocate().unwrap(), 8);
        assert_eq!(manager.allocate().unwrap(), 9);
        assert_eq!(manager.pending_count(), 3);
    }

    #[test]
    fn confirm_removes_from_pending() {
        let manager = NonceManager::new();
        manager.initialize(0);
        let nonce = manager.allocate().unwrap();

        manager.mark_confirmed(nonce);
        assert!(!manager.is_pending(nonce));
        assert_eq!(manager.stats().confirmed_count, 1);
    }

    #[test]
    fn failed_nonce_is_reused_before_later_ones() {
        let manager = NonceManager::new();
        manager.initialize(10);
        let first = manager.allocate().unwrap();
        let second = manager.allocate().unwrap();
        assert_eq!((first, second), (10, 11));

        manager.mark_failed(first);
        // The freed nonce comes back before anything later.
        assert_eq!(manager.allocate().unwrap(), 10);
    }

    #[test]
    fn allocate_then_fail_never_raises_next() {
        let manager = NonceManager::new();
        manager.initialize(5);
        let before = manager.stats().next.unwrap();

        let nonce = manager.allocate().unwrap();
        manager.mark_failed(nonce);

        assert!(manager.stats().next.unwrap() <= before);
    }

    #[test]
    fn confirmed_sequence_is_contiguous_after_failure_recovery() {
        let manager = NonceManager::new();
        manager.initialize(0);

        let n0 = manager.allocate().unwrap();
        manager.mark_confirmed(n0);

        let n1 = manager.allocate().unwrap();
        manager.mark_failed(n1);
        let n1_retry = manager.allocate().unwrap();
        assert_eq!(n1, n1_retry);
        manager.mark_confirmed(n1_retry);

        let n2 = manager.allocate().unwrap();
        manager.mark_confirmed(n2);

        assert_eq!(manager.stats().confirmed_count, 3);
        assert_eq!((n0, n1_retry, n2), (0, 1, 2));
    }

    #[test]
    fn failing_an_old_nonce_lowers_next() {
        let manager = NonceManager::new();
        manager.initialize(0);
        let a = manager.allocate().unwrap();
        let _b = manager.allocate().unwrap();
        let _c = manager.allocate().unwrap();

        manager.mark_failed(a);
        assert_eq!(manager.stats().next, Some(0));
    }
}
