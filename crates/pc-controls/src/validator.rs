//! Sensor validation gate.
//!
//! Raw readings are checked against a plausible range and a maximum rate of
//! change before they reach the controller. Valid readings pass through
//! unchanged; invalid ones are rejected so the fault stays visible.

use crate::error::{ControlError, ControlResult};
use pc_core::{ensure_bounds, ensure_finite};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a raw reading is rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum ValidationError {
    /// Reading outside `[min_valid, max_valid]`, or not a finite number.
    #[error("Reading {value} outside valid range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },

    /// Reading moved faster than the configured rate limit.
    #[error("Reading changed at {rate}/s, limit is {limit}/s")]
    ExcessiveRate { rate: f64, limit: f64 },

    /// Rate check requested over a non-positive interval.
    #[error("Invalid interval for rate check: {dt}")]
    InvalidInterval { dt: f64 },
}

/// Plausibility limits for one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorLimits {
    /// Lowest plausible reading.
    pub min_valid: f64,
    /// Highest plausible reading.
    pub max_valid: f64,
    /// Largest plausible change per second (absolute).
    pub max_rate_of_change: f64,
}

impl SensorLimits {
    pub fn validate(&self) -> ControlResult<()> {
        ensure_bounds(self.min_valid, self.max_valid, "sensor range")?;
        ensure_finite(self.max_rate_of_change, "max_rate_of_change")?;
        if self.max_rate_of_change <= 0.0 {
            return Err(ControlError::InvalidArg {
                what: "max_rate_of_change must be positive",
            });
        }
        Ok(())
    }
}

/// Stateless gate over [`SensorLimits`].
#[derive(Debug, Clone, PartialEq)]
pub struct SensorValidator {
    limits: SensorLimits,
}

impl SensorValidator {
    pub fn new(limits: SensorLimits) -> ControlResult<Self> {
        limits.validate()?;
        Ok(Self { limits })
    }

    pub fn limits(&self) -> &SensorLimits {
        &self.limits
    }

    /// Check `raw` against the range and against `previous` over `dt` seconds.
    ///
    /// Returns `raw` unchanged when it passes.
    pub fn validate(&self, raw: f64, previous: f64, dt: f64) -> Result<f64, ValidationError> {
        let SensorLimits {
            min_valid,
            max_valid,
            max_rate_of_change,
        } = self.limits;

        // NaN fails every comparison, so test for the valid case
        if !(raw >= min_valid && raw <= max_valid) {
            return Err(ValidationError::OutOfRange {
                value: raw,
                min: min_valid,
                max: max_valid,
            });
        }

        if !dt.is_finite() || dt <= 0.0 {
            return Err(ValidationError::InvalidInterval { dt });
        }

        let rate = (raw - previous).abs() / dt;
        if rate > max_rate_of_change {
            return Err(ValidationError::ExcessiveRate {
                rate,
                limit: max_rate_of_change,
            });
        }

        Ok(raw)
    }
}
