//! Error types for plant simulation.

use thiserror::Error;

/// Errors encountered while advancing a plant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Non-physical condition: {what}")]
    NonPhysical { what: &'static str },

    #[error(transparent)]
    Numeric(#[from] pc_core::CoreError),
}

pub type SimResult<T> = Result<T, SimError>;
