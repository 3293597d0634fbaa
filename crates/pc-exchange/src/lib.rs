//! Protocol exchange layer: Modbus TCP and OPC UA front ends over the shared
//! process state.
//!
//! Both front ends are thin mappings from `ProcessState` fields to protocol
//! addressable points:
//! - **Modbus**: holding/input registers with fixed-point scaling, setpoint
//!   writable through function codes 0x06/0x10
//! - **OPC UA**: a `Process` object node with typed variables, read/write/
//!   browse services and data change subscriptions
//!
//! Handlers copy a snapshot out of the state before doing any I/O and write
//! the setpoint only through `ProcessState::write_setpoint`, so no lock is ever
//! held across a socket operation.

pub mod error;
mod listener;
pub mod modbus;
pub mod opcua;

pub use error::{ExchangeError, ExchangeResult};
pub use modbus::{ModbusConfig, ModbusServer};
pub use opcua::{OpcUaConfig, OpcUaServer, OpcUaService};
