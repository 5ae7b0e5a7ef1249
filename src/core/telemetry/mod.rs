//! Telemetry: trace propagation, structured event log, latency windows.

mod events;
mod latency;
mod trace;

pub use events::{EventLog, EventType, TelemetryEvent};
pub use latency::{LatencyStages, LatencySummary, LatencyWindow};
pub use trace::{current_trace_id, generate_trace_id, with_trace};

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
