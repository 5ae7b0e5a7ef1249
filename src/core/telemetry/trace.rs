//! Trace ID generation and scoped propagation.
//!
//! One trace ID covers one logical detection-and-execution cycle. The
//! ID is bound as a task-local value for the duration of the cycle so
//! deeply nested code can attach it to telemetry without threading it
//! through every call.

use std::future::Future;

tokio::task_local! {
    static TRACE_ID: String;
}

/// Generate a unique trace ID (UUID v4).
#[must_use]
pub fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Run a future with the given trace ID bound for its duration.
pub async fn with_trace<F>(trace_id: String, f: F) -> F::Output
where
    F: Future,
{
    TRACE_ID.scope(trace_id, f).await
}

/// The trace ID bound to the current task, if any.
#[must_use]
pub fn current_trace_id() -> Option<String> {
    TRACE_ID.try_with(Clone::clone).ok()
}
