//! Control primitives for the process control core.
//!
//! This crate holds the numerical pieces of the loop that have no knowledge of
//! threads, sockets, or shared state:
//! - a PID controller with anti-windup and derivative-on-measurement
//! - a sensor validation gate that rejects implausible readings
//! - the sample period configuration of the loop
//!
//! # Design Principles
//!
//! - **Owned memory**: the controller owns its integral and derivative history;
//!   only `reset()` clears it
//! - **Gate, not filter**: the validator passes readings through unchanged or
//!   rejects them, it never repairs a reading
//! - **Intervals are checked**: every operation taking `dt` rejects `dt <= 0`

pub mod controller;
pub mod error;
pub mod sampled;
pub mod validator;

pub use controller::{PidController, PidMemory, PidParams, PidStep};
pub use error::{ControlError, ControlResult};
pub use sampled::SampleConfig;
pub use validator::{SensorLimits, SensorValidator, ValidationError};
