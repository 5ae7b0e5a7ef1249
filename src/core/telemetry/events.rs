//! Structured JSONL event log.
//!
//! Every externally visible decision point emits one line-delimited
//! JSON record tagged with its trace ID. The log is append-only; an
//! external alert engine and dashboard consume it.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use super::trace::current_trace_id;

/// Telemetry event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EventReceived,
    OpportunityDetected,
    RiskDecision,
    OrderSubmitted,
    Fill,
    PnlUpdate,
    CircuitStateChange,
    AnomalyDetected,
    ExecutionFailed,
}

/// A structured telemetry event.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub data: serde_json::Value,
}

/// Append-only JSONL sink for telemetry events.
///
/// Writes happen under a short mutex; emission failures are logged and
/// swallowed so telemetry can never take down the trading path.
pub struct EventLog {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl EventLog {
    /// Open (or create) a JSONL file in append mode.
    pub fn to_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(Box::new(BufWriter::new(file))),
        })
    }

    /// Write to an arbitrary sink. Used by tests and embedders that
    /// redirect telemetry.
    #[must_use]
    pub fn to_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Emit one event.
    ///
    /// The trace ID is taken from the argument, falling back to the
    /// task-local scope, falling back to `"untraced"`.
    pub fn emit(&self, event_type: EventType, data: serde_json::Value, trace_id: Option<&str>) {
        let trace_id = trace_id
            .map(ToString::to_string)
            .or_else(current_trace_id)
            .unwrap_or_else(|| "untraced".to_string());

        let event = TelemetryEvent {
            event_type,
            timestamp: Utc::now(),
            trace_id,
            data,
        };

        let mut writer = self.writer.lock();
        let result = serde_json::to_writer(&mut *writer, &event)
            .map_err(std::io::Error::from)
            .and_then(|()| writer.write_all(b"\n"));
        if let Err(e) = result {
            warn!(error = %e, "Failed to write telemetry event");
        }
    }

    /// Flush buffered events to the sink.
    pub fn flush(&self) {
        if let Err(e) = self.writer.lock().flush() {
            warn!(error = %e, "Failed to flush telemetry sink");
        }
    }
}
