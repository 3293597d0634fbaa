//! Error types for the protocol exchange layer.

use std::time::Duration;

/// Errors raised by the protocol servers.
///
/// These describe transport problems; protocol-level rejections (Modbus
/// exceptions, OPC UA status codes) are sent back to the client instead.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {what}")]
    Frame { what: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid node id: {0}")]
    NodeId(String),

    #[error("Invalid configuration: {what}")]
    InvalidConfig { what: String },
}

/// Result type for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
