//! Latency sampling and sliding-window percentiles.
//!
//! Each detection cycle is sampled at four stages: feed receipt to book
//! apply, book to signal, signal to risk decision, risk decision to
//! send. Percentiles are computed over a sliding wall-clock window.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Per-stage latencies of one cycle, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencyStages {
    pub feed_to_book_ms: f64,
    pub book_to_signal_ms: f64,
    pub signal_to_risk_ms: f64,
    pub risk_to_send_ms: f64,
}

impl LatencyStages {
    /// End-to-end latency: the sum of all stages.
    #[must_use]
    pub fn end_to_end_ms(&self) -> f64 {
        self.feed_to_book_ms + self.book_to_signal_ms + self.signal_to_risk_ms + self.risk_to_send_ms
    }
}

/// Aggregated latency statistics over the window.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct LatencySummary {
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

struct Sample {
    end_to_end_ms: f64,
    recorded_at: Instant,
}

/// Sliding window of end-to-end latency samples.
pub struct LatencyWindow {
    window: Duration,
    samples: Mutex<VecDeque<Sample>>,
}

impl LatencyWindow {
    /// Create a window covering the given duration.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one cycle's stage latencies.
    pub fn record(&self, stages: LatencyStages) {
        let mut samples = self.samples.lock();
        samples.push_back(Sample {
            end_to_end_ms: stages.end_to_end_ms(),
            recorded_at: Instant::now(),
        });
        Self::evict(&mut samples, self.window);
    }

    /// Summarize the samples currently inside the window.
    ///
    /// Returns `None` when the window is empty.
    #[must_use]
    pub fn summary(&self) -> Option<LatencySummary> {
        let mut samples = self.samples.lock();
        Self::evict(&mut samples, self.window);
        if samples.is_empty() {
            return None;
        }

        let mut values: Vec<f64> = samples.iter().map(|s| s.end_to_end_ms).collect();
        values.sort_by(f64::total_cmp);

        let count = values.len();
        let sum: f64 = values.iter().sum();

        Some(LatencySummary {
            count,
            avg_ms: sum / count as f64,
            min_ms: values[0],
            max_ms: values[count - 1],
            p50_ms: percentile(&values, 50.0),
            p95_ms: percentile(&values, 95.0),
            p99_ms: percentile(&values, 99.0),
        })
    }

    fn evict(samples: &mut VecDeque<Sample>, window: Duration) {
        let now = Instant::now();
        while let Some(front) = samples.front() {
            if now.duration_since(front.recorded_at) > window {
                samples.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// Nearest-rank percentile over sorted values.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
