//! Order book cache with sequence tracking and update notifications.
//!
//! The cache is the single writer target for the feed task and serves
//! consistent snapshots to detector tasks. Sequence numbers, when the
//! feed provides them, are enforced per token: stale messages are
//! discarded, gaps are counted but applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::core::domain::{LevelDelta, OrderBook, PriceLevel, TokenId};

/// Notification sent when an order book changes.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    /// The token whose book was updated.
    pub token_id: TokenId,
}

/// Counters describing what the cache has ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookStats {
    pub snapshots_applied: u64,
    pub updates_applied: u64,
    pub duplicates_discarded: u64,
    pub sequence_gaps: u64,
}

#[derive(Debug, Default)]
struct Counters {
    snapshots_applied: AtomicU64,
    updates_applied: AtomicU64,
    duplicates_discarded: AtomicU64,
    sequence_gaps: AtomicU64,
}

/// Thread-safe cache of order books with optional broadcast notifications.
pub struct BookCache {
    books: RwLock<HashMap<TokenId, OrderBook>>,
    tx: Option<broadcast::Sender<BookUpdate>>,
    counters: Counters,
}

impl BookCache {
    /// Create a new cache without notifications.
    #[must_use]
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
            tx: None,
            counters: Counters::default(),
        }
    }

    /// Create a new cache with broadcast notifications.
    ///
    /// Returns the cache and a receiver for subscribing to updates.
    /// Additional receivers can be created via `subscribe()`.
    #[must_use]
    pub fn with_notifications(capacity: usize) -> (Self, broadcast::Receiver<BookUpdate>) {
        let (tx, rx) = broadcast::channel(capacity);
        let cache = Self {
            books: RwLock::new(HashMap::new()),
            tx: Some(tx),
            counters: Counters::default(),
        };
        (cache, rx)
    }

    /// Subscribe to book update notifications.
    ///
    /// Returns `None` if the cache was created without notifications.
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<BookUpdate>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }

    /// Apply a full snapshot, replacing any existing book for the token.
    ///
    /// Returns `true` if the snapshot was applied, `false` if it was
    /// discarded as a stale duplicate.
    pub fn apply_snapshot(
        &self,
        token_id: TokenId,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        timestamp_ms: i64,
        sequence: Option<u64>,
    ) -> bool {
        {
            let mut books = self.books.write();
            let book = books
                .entry(token_id.clone())
                .or_insert_with(|| OrderBook::new(token_id.clone()));

            if self.is_stale(book, sequence, &token_id) {
                return false;
            }
            self.note_gap(book, sequence, &token_id);
            book.replace(bids, asks, timestamp_ms, sequence);
        }
        self.counters.snapshots_applied.fetch_add(1, Ordering::Relaxed);
        self.notify(token_id);
        true
    }

    /// Apply per-level deltas to an existing book.
    ///
    /// Updates for tokens with no snapshot yet are dropped: without a
    /// baseline the deltas cannot produce a coherent book.
    pub fn apply_update(
        &self,
        token_id: &TokenId,
        bid_deltas: &[LevelDelta],
        ask_deltas: &[LevelDelta],
        timestamp_ms: i64,
        sequence: Option<u64>,
    ) -> bool {
        {
            let mut books = self.books.write();
            let Some(book) = books.get_mut(token_id) else {
                debug!(token_id = %token_id, "Update for token without snapshot, dropping");
                return false;
            };

            if self.is_stale(book, sequence, token_id) {
                return false;
            }
            self.note_gap(book, sequence, token_id);
            book.apply_deltas(bid_deltas, ask_deltas, timestamp_ms, sequence);
        }
        self.counters.updates_applied.fetch_add(1, Ordering::Relaxed);
        self.notify(token_id.clone());
        true
    }

    /// Get a snapshot of an order book.
    #[must_use]
    pub fn get(&self, token_id: &TokenId) -> Option<OrderBook> {
        self.books.read().get(token_id).cloned()
    }

    /// Get snapshots of two order books atomically.
    #[must_use]
    pub fn get_pair(
        &self,
        token_a: &TokenId,
        token_b: &TokenId,
    ) -> (Option<OrderBook>, Option<OrderBook>) {
        let books = self.books.read();
        (books.get(token_a).cloned(), books.get(token_b).cloned())
    }

    /// Get snapshots of multiple order books atomically.
    #[must_use]
    pub fn get_many(&self, token_ids: &[TokenId]) -> Vec<Option<OrderBook>> {
        let books = self.books.read();
        token_ids.iter().map(|id| books.get(id).cloned()).collect()
    }

    /// Number of books in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the ingestion counters.
    #[must_use]
    pub fn stats(&self) -> BookStats {
        BookStats {
            snapshots_applied: self.counters.snapshots_applied.load(Ordering::Relaxed),
            updates_applied: self.counters.updates_applied.load(Ordering::Relaxed),
            duplicates_discarded: self.counters.duplicates_discarded.load(Ordering::Relaxed),
            sequence_gaps: self.counters.sequence_gaps.load(Ordering::Relaxed),
        }
    }

    fn is_stale(&self, book: &OrderBook, sequence: Option<u64>, token_id: &TokenId) -> bool {
        if let (Some(seq), Some(last)) = (sequence, book.sequence()) {
            if seq <= last {
                debug!(token_id = %token_id, seq, last, "Discarding stale message");
                self.counters
                    .duplicates_discarded
                    .fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    fn note_gap(&self, book: &OrderBook, sequence: Option<u64>, token_id: &TokenId) {
        if let (Some(seq), Some(last)) = (sequence, book.sequence()) {
            if seq > last + 1 {
                warn!(
                    token_id = %token_id,
                    expected = last + 1,
                    got = seq,
                    "Sequence gap, applying anyway"
                );
                self.counters.sequence_gaps.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn notify(&self, token_id: TokenId) {
        // Ignore send errors: no receivers is fine.
        if let Some(ref tx) = self.tx {
            let _ = tx.send(BookUpdate { token_id });
        }
    }
}

impl Default for BookCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn asks(levels: &[(rust_decimal::Decimal, rust_decimal::Decimal)]) -> Vec<PriceLevel> {
        levels.iter().map(|(p, s)| PriceLevel::new(*p, *s)).collect()
    }

    #[test]
    fn snapshot_then_get() {
        let cache = BookCache::new();
        let token = TokenId::from("tok");

        cache.apply_snapshot(token.clone(), vec![], asks(&[(dec!(0.50), dec!(10))]), 1, None);

        let book = cache.get(&token).unwrap();
        assert_eq!(book.best_ask().unwrap().price(), dec!(0.50));
        assert_eq!(cache.stats().snapshots_applied, 1);
    }

    #[test]
    fn update_without_snapshot_is_dropped() {
        let cache = BookCache::new();
        let applied = cache.apply_update(
            &TokenId::from("tok"),
            &[],
            &[LevelDelta {
                price: dec!(0.50),
                size: dec!(5),
            }],
            1,
            None,
        );
        assert!(!applied);
        assert!(cache.is_empty());
    }

    #[test]
    fn stale_sequence_is_discarded() {
        let cache = BookCache::new();
        let token = TokenId::from("tok");

        cache.apply_snapshot(token.clone(), vec![], asks(&[(dec!(0.50), dec!(10))]), 1, Some(5));
        let applied = cache.apply_update(
            &token,
            &[],
            &[LevelDelta {
                price: dec!(0.40),
                size: dec!(1),
            }],
            2,
            Some(5),
        );

        assert!(!applied);
        assert_eq!(cache.stats().duplicates_discarded, 1);
        // Book is unchanged by the duplicate.
        let book = cache.get(&token).unwrap();
        assert_eq!(book.best_ask().unwrap().price(), dec!(0.50));
    }

    #[test]
    fn gap_is_counted_but_applied() {
        let cache = BookCache::new();
        let token = TokenId::from("tok");

        cache.apply_snapshot(token.clone(), vec![], asks(&[(dec!(0.50), dec!(10))]), 1, Some(5));
        let applied = cache.apply_update(
            &token,
            &[],
            &[LevelDelta {
                price: dec!(0.40),
                size: dec!(1),
            }],
            2,
            Some(9),
        );

        assert!(applied);
        assert_eq!(cache.stats().sequence_gaps, 1);
        let book = cache.get(&token).unwrap();
        assert_eq!(book.best_ask().unwrap().price(), dec!(0.40));
        assert_eq!(book.sequence(), Some(9));
    }

    #[test]
    fn get_pair_is_atomic_snapshot() {
        let cache = BookCache::new();
        let (a, b) = (TokenId::from("a"), TokenId::from("b"));

        cache.apply_snapshot(a.clone(), vec![], asks(&[(dec!(0.40), dec!(50))]), 1, None);
        cache.apply_snapshot(b.clone(), vec![], asks(&[(dec!(0.55), dec!(75))]), 1, None);

        let (book_a, book_b) = cache.get_pair(&a, &b);
        assert_eq!(book_a.unwrap().best_ask().unwrap().price(), dec!(0.40));
        assert_eq!(book_b.unwrap().best_ask().unwrap().price(), dec!(0.55));
    }

    #[test]
    fn get_many_preserves_order() {
        let cache = BookCache::new();
        let tokens: Vec<TokenId> = (0..3).map(|i| TokenId::from(format!("tok-{i}"))).collect();
        for (i, token) in tokens.iter().enumerate() {
            let price = rust_decimal::Decimal::from(i as u32 + 1) / rust_decimal::Decimal::from(10);
            cache.apply_snapshot(token.clone(), vec![], asks(&[(price, dec!(100))]), 1, None);
        }

        let results = cache.get_many(&tokens);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(Option::is_some));
    }

    #[tokio::test]
    async fn notifications_are_broadcast() {
        let (cache, mut rx) = BookCache::with_notifications(16);
        let token = TokenId::from("tok");

        cache.apply_snapshot(token, vec![], asks(&[(dec!(0.45), dec!(100))]), 1, None);

        let update = rx.recv().await.unwrap();
        assert_eq!(update.token_id.as_str(), "tok");
    }
}
