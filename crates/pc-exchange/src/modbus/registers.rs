//! Register map between [`ProcessSnapshot`] fields and 16-bit registers.

use super::frame::ExceptionCode;
use crate::error::{ExchangeError, ExchangeResult};
use pc_runtime::{ProcessSnapshot, ProcessState, RuntimeError};

/// Number of mapped registers per block.
pub const REGISTER_COUNT: u16 = 7;

/// One mapped point, numbered by its offset from the base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Setpoint,
    Measurement,
    Output,
    Status,
    LoopState,
    ConsecutiveFaults,
    StopReason,
}

impl Register {
    pub const ALL: [Register; REGISTER_COUNT as usize] = [
        Register::Setpoint,
        Register::Measurement,
        Register::Output,
        Register::Status,
        Register::LoopState,
        Register::ConsecutiveFaults,
        Register::StopReason,
    ];

    pub fn from_offset(offset: u16) -> Option<Self> {
        Self::ALL.get(usize::from(offset)).copied()
    }

    pub fn offset(self) -> u16 {
        self as u16
    }

    /// Only the setpoint accepts writes.
    pub fn writable(self) -> bool {
        matches!(self, Register::Setpoint)
    }
}

/// Where the map lives and how analog values are scaled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterMap {
    base_address: u16,
    scale: f64,
}

impl RegisterMap {
    /// # Errors
    ///
    /// [`ExchangeError::InvalidConfig`] if `scale` is not finite and positive
    /// or the block would run past address 0xFFFF.
    pub fn new(base_address: u16, scale: f64) -> ExchangeResult<Self> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(ExchangeError::InvalidConfig {
                what: format!("register scale must be finite and > 0, got {scale}"),
            });
        }
        if base_address.checked_add(REGISTER_COUNT - 1).is_none() {
            return Err(ExchangeError::InvalidConfig {
                what: format!("base address {base_address} leaves no room for the register map"),
            });
        }
        Ok(Self {
            base_address,
            scale,
        })
    }

    pub fn base_address(&self) -> u16 {
        self.base_address
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn register_at(&self, address: u16) -> Option<Register> {
        address
            .checked_sub(self.base_address)
            .and_then(Register::from_offset)
    }

    /// Fixed-point encode, saturating at the i16 range. NaN encodes as 0.
    pub fn encode_scaled(&self, value: f64) -> u16 {
        let scaled = (value * self.scale)
            .round()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX));
        scaled as i16 as u16
    }

    pub fn decode_scaled(&self, raw: u16) -> f64 {
        f64::from(raw as i16) / self.scale
    }

    pub fn value_of(&self, register: Register, snapshot: &ProcessSnapshot) -> u16 {
        match register {
            Register::Setpoint => self.encode_scaled(snapshot.setpoint),
            Register::Measurement => self.encode_scaled(snapshot.measurement),
            Register::Output => self.encode_scaled(snapshot.output),
            Register::Status => snapshot.status.code(),
            Register::LoopState => snapshot.loop_state.code(),
            Register::ConsecutiveFaults => {
                u16::try_from(snapshot.consecutive_faults).unwrap_or(u16::MAX)
            }
            Register::StopReason => snapshot.stop_reason.map_or(0, |r| r.code()),
        }
    }

    /// Read `count` consecutive registers starting at `start`.
    ///
    /// Every address in the range must be mapped.
    pub fn read(
        &self,
        snapshot: &ProcessSnapshot,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>, ExceptionCode> {
        (0..count)
            .map(|i| {
                start
                    .checked_add(i)
                    .and_then(|address| self.register_at(address))
                    .map(|register| self.value_of(register, snapshot))
                    .ok_or(ExceptionCode::IllegalDataAddress)
            })
            .collect()
    }

    /// Write `values` starting at `start`.
    ///
    /// The whole request is checked before anything is applied: an unmapped or
    /// read-only address fails with [`ExceptionCode::IllegalDataAddress`], a
    /// value outside the setpoint range with
    /// [`ExceptionCode::IllegalDataValue`].
    pub fn write(
        &self,
        state: &ProcessState,
        start: u16,
        values: &[u16],
    ) -> Result<(), ExceptionCode> {
        let mut setpoint = None;
        for (i, raw) in values.iter().enumerate() {
            let register = u16::try_from(i)
                .ok()
                .and_then(|i| start.checked_add(i))
                .and_then(|address| self.register_at(address))
                .filter(|r| r.writable())
                .ok_or(ExceptionCode::IllegalDataAddress)?;
            if register == Register::Setpoint {
                setpoint = Some(self.decode_scaled(*raw));
            }
        }
        if let Some(value) = setpoint {
            state
                .write_setpoint(value)
                .map_err(|err| ExceptionCode::from(&err))?;
        }
        Ok(())
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            base_address: 0,
            scale: 100.0,
        }
    }
}

impl From<&RuntimeError> for ExceptionCode {
    fn from(err: &RuntimeError) -> Self {
        match err {
            RuntimeError::RejectedWrite { .. } => ExceptionCode::IllegalDataValue,
            _ => ExceptionCode::ServerDeviceFailure,
        }
    }
}

/// Basic device identification objects (function 0x2B / MEI 0x0E).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub vendor_name: String,
    pub product_code: String,
    pub revision: String,
}

impl DeviceIdentity {
    /// Object id / value pairs in id order.
    pub fn objects(&self) -> [(u8, &str); 3] {
        [
            (0x00, self.vendor_name.as_str()),
            (0x01, self.product_code.as_str()),
            (0x02, self.revision.as_str()),
        ]
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            vendor_name: "pc-process-control".to_string(),
            product_code: "PC-PID".to_string(),
            revision: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
