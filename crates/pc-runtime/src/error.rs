//! Error types for the control runtime.

use thiserror::Error;

/// Errors raised by the control loop and the shared process state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Invalid loop interval: dt must be positive and finite (got {dt})")]
    InvalidInterval { dt: f64 },

    #[error("Invalid configuration: {what}")]
    InvalidConfig { what: String },

    #[error(
        "Sensor fault escalation after {consecutive} consecutive faults; output forced to {safe_output}"
    )]
    SensorFaultEscalation { consecutive: u32, safe_output: f64 },

    #[error("Rejected setpoint write {value}: allowed range is [{min}, {max}]")]
    RejectedWrite { value: f64, min: f64, max: f64 },

    #[error("Control loop is not running")]
    NotRunning,

    #[error("Controller error: {0}")]
    Control(#[from] pc_controls::ControlError),

    #[error("Plant error: {0}")]
    Simulation(#[from] pc_sim::SimError),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
