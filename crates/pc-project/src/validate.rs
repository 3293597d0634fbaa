//! Configuration validation.
//!
//! Everything the runtime would reject at startup is caught here first, so a
//! config that validates can be compiled into a running system.

use crate::schema::{CURRENT_VERSION, PlantConfig, RangeDef};
use std::collections::HashSet;
use std::net::SocketAddr;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Duplicate fault tick: {tick}")]
    DuplicateFault { tick: u64 },

    #[error("Modbus and OPC UA both bind {addr}")]
    BindConflict { addr: String },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn finite(field: &str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(field, value, "must be finite"))
    }
}

fn positive(field: &str, value: f64) -> Result<f64, ValidationError> {
    if finite(field, value)? > 0.0 {
        Ok(value)
    } else {
        Err(invalid(field, value, "must be > 0"))
    }
}

fn range(field: &str, r: RangeDef) -> Result<RangeDef, ValidationError> {
    finite(&format!("{field}.min"), r.min)?;
    finite(&format!("{field}.max"), r.max)?;
    if r.min < r.max {
        Ok(r)
    } else {
        Err(invalid(
            field,
            format!("[{}, {}]", r.min, r.max),
            "min must be < max",
        ))
    }
}

fn within(field: &str, value: f64, r: RangeDef) -> Result<(), ValidationError> {
    if value >= r.min && value <= r.max {
        Ok(())
    } else {
        Err(invalid(
            field,
            value,
            &format!("must lie in [{}, {}]", r.min, r.max),
        ))
    }
}

/// Analog registers are signed 16-bit fixed point; a range that overflows
/// them would read back clipped over Modbus.
fn fits_register(field: &str, r: RangeDef, scale: f64) -> Result<(), ValidationError> {
    let lo = (r.min * scale).round();
    let hi = (r.max * scale).round();
    if lo >= f64::from(i16::MIN) && hi <= f64::from(i16::MAX) {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("[{}, {}]", r.min, r.max),
            &format!("does not fit a 16-bit register at modbus.scale {scale}"),
        ))
    }
}

fn bind_addr(field: &str, addr: &str) -> Result<SocketAddr, ValidationError> {
    addr.parse()
        .map_err(|_| invalid(field, addr, "expected host:port with an IP address"))
}

pub fn validate_config(config: &PlantConfig) -> Result<(), ValidationError> {
    if config.version == 0 || config.version > CURRENT_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: config.version,
        });
    }
    if config.name.trim().is_empty() {
        return Err(invalid("name", "\"\"", "must not be empty"));
    }

    let c = &config.controller;
    for (field, gain) in [("controller.kp", c.kp), ("controller.ki", c.ki), ("controller.kd", c.kd)] {
        if finite(field, gain)? < 0.0 {
            return Err(invalid(field, gain, "must be >= 0"));
        }
    }
    let output = range(
        "controller.output",
        RangeDef {
            min: c.out_min,
            max: c.out_max,
        },
    )?;
    if let Some(limits) = c.integral_limits {
        range("controller.integral_limits", limits)?;
    }

    let s = &config.sensor;
    let sensor = range(
        "sensor",
        RangeDef {
            min: s.min_valid,
            max: s.max_valid,
        },
    )?;
    positive("sensor.max_rate_of_change", s.max_rate_of_change)?;

    let l = &config.control_loop;
    let period = positive("control_loop.period_s", l.period_s)?;
    if l.fault_threshold == 0 {
        return Err(invalid("control_loop.fault_threshold", 0, "must be >= 1"));
    }
    within("control_loop.safe_output", finite("control_loop.safe_output", l.safe_output)?, output)?;

    let p = &config.plant;
    finite("plant.gain", p.gain)?;
    let tau = positive("plant.time_constant_s", p.time_constant_s)?;
    if period > tau {
        return Err(invalid(
            "control_loop.period_s",
            period,
            "must not exceed plant.time_constant_s",
        ));
    }
    within("plant.initial_measurement", p.initial_measurement, sensor)?;
    if let Some(d) = p.disturbance {
        if finite("plant.disturbance.amplitude", d.amplitude)? < 0.0 {
            return Err(invalid("plant.disturbance.amplitude", d.amplitude, "must be >= 0"));
        }
    }

    let limits = range("process.setpoint_limits", config.process.setpoint_limits)?;
    within("process.setpoint", config.process.setpoint, limits)?;

    let m = &config.modbus;
    let modbus_addr = bind_addr("modbus.bind", &m.bind)?;
    let scale = positive("modbus.scale", m.scale)?;
    fits_register("process.setpoint_limits", limits, scale)?;
    fits_register("sensor", sensor, scale)?;
    fits_register("controller.output", output, scale)?;
    if m.base_address > u16::MAX - 6 {
        return Err(invalid(
            "modbus.base_address",
            m.base_address,
            "register map would pass address 65535",
        ));
    }
    if m.request_timeout_ms == 0 {
        return Err(invalid("modbus.request_timeout_ms", 0, "must be > 0"));
    }

    let o = &config.opcua;
    let opcua_addr = bind_addr("opcua.bind", &o.bind)?;
    if o.namespace_uri.trim().is_empty() {
        return Err(invalid("opcua.namespace_uri", "\"\"", "must not be empty"));
    }
    if o.session_timeout_ms == 0 || o.request_timeout_ms == 0 {
        return Err(invalid("opcua timeouts", 0, "must be > 0"));
    }

    if m.enabled && o.enabled && modbus_addr == opcua_addr && modbus_addr.port() != 0 {
        return Err(ValidationError::BindConflict {
            addr: modbus_addr.to_string(),
        });
    }

    let mut ticks = HashSet::new();
    for fault in &config.faults {
        if fault.tick == 0 {
            return Err(invalid("faults.tick", 0, "ticks are numbered from 1"));
        }
        if !ticks.insert(fault.tick) {
            return Err(ValidationError::DuplicateFault { tick: fault.tick });
        }
    }

    Ok(())
}
