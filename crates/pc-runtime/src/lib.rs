//! Runtime of the process control core.
//!
//! Ties the control primitives and the plant together:
//! - `ProcessState`: the single shared snapshot every consumer reads and the
//!   only place external setpoint writes land
//! - `ControlLoop`: the fixed-period tick (simulate, validate, control,
//!   publish) and its Stopped/Running state machine
//!
//! # Concurrency
//!
//! `ProcessState` wraps one `tokio::sync::watch` channel. Every write is a
//! single short `send_modify`; every read copies the whole snapshot out, so
//! readers never observe a half-written tick. The loop owns its controller and
//! plant exclusively and ticks through `&mut self`, so ticks never overlap.

pub mod control_loop;
pub mod error;
pub mod state;

pub use control_loop::{ControlLoop, LoopConfig, LoopExit, TickReport};
pub use error::{RuntimeError, RuntimeResult};
pub use state::{
    LoopState, ProcessSnapshot, ProcessState, ProcessStatus, SetpointRange, StopReason,
    TickUpdate,
};
