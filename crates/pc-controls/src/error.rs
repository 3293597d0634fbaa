//! Error types for control operations.

use thiserror::Error;

/// Result type for control operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur in control operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// Non-positive or non-finite time interval.
    #[error("Invalid interval: dt must be positive and finite (got {dt})")]
    InvalidInterval { dt: f64 },

    /// Non-finite input or inverted bounds.
    #[error(transparent)]
    Numeric(#[from] pc_core::CoreError),
}
