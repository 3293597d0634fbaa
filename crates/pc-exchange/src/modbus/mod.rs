//! Modbus TCP front end.
//!
//! Register map (offsets from the configured base address, identical for
//! holding and input registers):
//!
//! | Offset | Point              | Access | Encoding                               |
//! |--------|--------------------|--------|----------------------------------------|
//! | 0      | setpoint           | RW     | signed, × scale                        |
//! | 1      | measurement        | R      | signed, × scale                        |
//! | 2      | output             | R      | signed, × scale                        |
//! | 3      | status             | R      | 0 nominal, 1 fault, 2 sat.             |
//! | 4      | loop state         | R      | 0 stopped, 1 running                   |
//! | 5      | consecutive faults | R      | unsigned, saturating                   |
//! | 6      | stop reason        | R      | 0 none, 1 shutdown, 2 fault, 3 failure |
//!
//! Only offset 0 of the holding block is writable.

mod frame;
mod registers;
mod server;

pub use frame::{
    DeviceIdRead, ExceptionCode, MBAP_HEADER_LEN, MbapHeader, Request, Response, decode_frame,
    encode_frame, handle_pdu,
};
pub use registers::{DeviceIdentity, Register, RegisterMap, REGISTER_COUNT};
pub use server::{ModbusConfig, ModbusServer};
