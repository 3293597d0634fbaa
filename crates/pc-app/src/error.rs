//! Error types for the pc-app service layer.

use pc_runtime::RuntimeError;
use std::path::PathBuf;

/// Application error type wrapping the backend crates' errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Failed to read config file: {path}")]
    ConfigFileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Compilation failed: {0}")]
    Compile(String),

    #[error("Control loop error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Protocol server error: {0}")]
    Exchange(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for pc-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<pc_project::ProjectError> for AppError {
    fn from(err: pc_project::ProjectError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<pc_controls::ControlError> for AppError {
    fn from(err: pc_controls::ControlError) -> Self {
        AppError::Compile(err.to_string())
    }
}

impl From<pc_sim::SimError> for AppError {
    fn from(err: pc_sim::SimError) -> Self {
        AppError::Compile(err.to_string())
    }
}

impl From<pc_exchange::ExchangeError> for AppError {
    fn from(err: pc_exchange::ExchangeError) -> Self {
        AppError::Exchange(err.to_string())
    }
}
