//! Thread-safe order book store.

mod cache;

pub use cache::{BookCache, BookStats, BookUpdate};
