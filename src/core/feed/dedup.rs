//! Wire-level duplicate filtering.
//!
//! A bounded LRU of message fingerprints. The feed may deliver the same
//! frame twice across reconnects or redundant connections; hashing the
//! raw text catches those before any parsing happens. The hit rate is
//! observable for dashboards.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};

use parking_lot::Mutex;

/// Observable dedup counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl DedupStats {
    /// Fraction of checked messages that were duplicates.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

struct Inner {
    seen: HashMap<u64, ()>,
    order: VecDeque<u64>,
    hits: u64,
    misses: u64,
}

/// Bounded LRU cache of recent message fingerprints.
pub struct FingerprintCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl FingerprintCache {
    /// Create a cache holding at most `capacity` fingerprints.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                seen: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Check whether the raw message was seen recently, recording it.
    ///
    /// Returns `true` for duplicates.
    pub fn is_duplicate(&self, raw: &str) -> bool {
        let fingerprint = Self::fingerprint(raw);
        let mut inner = self.inner.lock();

        if inner.seen.contains_key(&fingerprint) {
            inner.hits += 1;
            return true;
        }

        inner.misses += 1;
        inner.seen.insert(fingerprint, ());
        inner.order.push_back(fingerprint);
        while inner.order.len() > self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.seen.remove(&evicted);
            }
        }
        false
    }

    /// Snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> DedupStats {
        let inner = self.inner.lock();
        DedupStats {
            hits: inner.hits,
            misses: inner.misses,
            entries: inner.seen.len(),
        }
    }

    fn fingerprint(raw: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        raw.hash(&mut hasher);
        hasher.finish()
    }
}
