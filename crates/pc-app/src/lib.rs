//! Application service layer for process control.
//!
//! Shared by every frontend: loads and validates configs, compiles them into
//! a control loop over a simulated plant, runs offline simulations, and hosts
//! the loop together with its protocol servers.

pub mod compile;
pub mod error;
pub mod project_service;
pub mod run_service;

pub use compile::{CompiledSystem, SimulatedPlant, compile_system};
pub use error::{AppError, AppResult};
pub use project_service::{ConfigSummary, load_config, render_yaml, summarize};
pub use run_service::{
    ProcessService, ServeOutcome, ServeReport, SimulateOptions, SimulationReport, TickRecord,
    records_to_csv, serve, simulate,
};
