use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

/// Failures raised by the execution pipeline.
///
/// `CircuitOpen`, `DuplicateSignal`, and `Cancelled` are safety
/// refusals: they carry no side effects and must never be retried.
/// The rest classify per the retry policy's error patterns.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    #[error("Duplicate signal suppressed: {key}")]
    DuplicateSignal { key: String },

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Execution capacity exhausted ({in_flight} in flight)")]
    CapacityExhausted { in_flight: usize },

    #[error("Insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance { have: String, need: String },

    #[error("Nonce manager not initialized")]
    NonceUninitialized,

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    #[error("No order book for token {0}")]
    MissingBook(String),

    #[error("Insufficient depth for token {0}")]
    InsufficientDepth(String),

    #[error("Receipt not found within timeout for tx {0}")]
    ReceiptTimeout(String),

    #[error("Transaction reverted: {0}")]
    Reverted(String),
}

pub type Result<T> = std::result::Result<T, Error>;
