//! PID controller.
//!
//! Standard parallel form with:
//! - Integral clamping (anti-windup)
//! - Derivative on measurement, so setpoint steps do not kick the output
//! - Output clamping with a saturation flag
//!
//! The controller owns its memory. [`PidParams::update`] is the pure form of
//! the algorithm; [`PidController`] wraps it and keeps the memory between
//! samples.

use crate::error::{ControlError, ControlResult};
use pc_core::{ensure_bounds, ensure_finite, saturate};
use serde::{Deserialize, Serialize};

/// PID controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PidParams {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain (1/s).
    pub ki: f64,
    /// Derivative gain (s).
    pub kd: f64,
    /// Minimum output value.
    pub out_min: f64,
    /// Maximum output value.
    pub out_max: f64,
    /// Lower clamp for the integral accumulator.
    pub integral_min: f64,
    /// Upper clamp for the integral accumulator.
    pub integral_max: f64,
}

impl PidParams {
    /// Create PID parameters with an unbounded (but finite) integral.
    ///
    /// # Arguments
    ///
    /// * `kp` - Proportional gain
    /// * `ki` - Integral gain
    /// * `kd` - Derivative gain
    /// * `out_min` - Minimum output
    /// * `out_max` - Maximum output
    pub fn new(kp: f64, ki: f64, kd: f64, out_min: f64, out_max: f64) -> ControlResult<Self> {
        let params = Self {
            kp,
            ki,
            kd,
            out_min,
            out_max,
            integral_min: f64::MIN,
            integral_max: f64::MAX,
        };
        params.validate()?;
        Ok(params)
    }

    /// Set the anti-windup clamp of the integral accumulator.
    pub fn with_integral_limits(mut self, min: f64, max: f64) -> ControlResult<Self> {
        self.integral_min = min;
        self.integral_max = max;
        self.validate()?;
        Ok(self)
    }

    /// Check gains and bounds. Deserialized parameters must pass this before use.
    pub fn validate(&self) -> ControlResult<()> {
        ensure_finite(self.kp, "kp")?;
        ensure_finite(self.ki, "ki")?;
        ensure_finite(self.kd, "kd")?;
        ensure_bounds(self.out_min, self.out_max, "output limits")?;
        if self.out_min >= self.out_max {
            return Err(ControlError::InvalidArg {
                what: "out_min must be less than out_max",
            });
        }
        ensure_bounds(self.integral_min, self.integral_max, "integral limits")?;
        Ok(())
    }

    /// Compute controller output.
    ///
    /// # Arguments
    ///
    /// * `memory` - Controller memory from the previous sample
    /// * `sp` - Setpoint (desired value)
    /// * `pv` - Process variable (validated measurement)
    /// * `dt` - Time since last update (seconds)
    ///
    /// # Returns
    ///
    /// Updated memory and the step result. On error the caller's memory is
    /// left as it was.
    pub fn update(
        &self,
        memory: &PidMemory,
        sp: f64,
        pv: f64,
        dt: f64,
    ) -> ControlResult<(PidMemory, PidStep)> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ControlError::InvalidInterval { dt });
        }
        ensure_finite(sp, "setpoint")?;
        ensure_finite(pv, "measurement")?;

        // Error: e = sp - pv (positive error means PV is below setpoint)
        let error = sp - pv;
        let p_term = self.kp * error;

        let (integral, _) = saturate(
            memory.integral + error * dt,
            self.integral_min,
            self.integral_max,
        );
        let i_term = self.ki * integral;

        // No history right after construction or reset: no derivative action
        let derivative = if memory.primed {
            -(pv - memory.previous_measurement) / dt
        } else {
            0.0
        };
        let d_term = self.kd * derivative;

        let raw_output = p_term + i_term + d_term;
        let (output, saturated) = saturate(raw_output, self.out_min, self.out_max);

        let new_memory = PidMemory {
            integral,
            last_error: error,
            previous_measurement: pv,
            primed: true,
        };

        Ok((
            new_memory,
            PidStep {
                output,
                raw_output,
                saturated,
            },
        ))
    }
}

/// PID controller memory.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PidMemory {
    /// Integral accumulator.
    pub integral: f64,
    /// Error of the last sample.
    pub last_error: f64,
    /// Measurement of the last sample, for the derivative term.
    pub previous_measurement: f64,
    /// Whether `previous_measurement` holds a real sample.
    pub primed: bool,
}

/// Result of one controller sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidStep {
    /// Commanded output, within the configured limits.
    pub output: f64,
    /// Output before clamping.
    pub raw_output: f64,
    /// True when `output` was clamped this sample.
    pub saturated: bool,
}

/// Stateful PID controller: parameters plus owned memory.
#[derive(Debug, Clone, PartialEq)]
pub struct PidController {
    params: PidParams,
    memory: PidMemory,
}

impl PidController {
    /// Create a controller with zeroed memory.
    pub fn new(params: PidParams) -> ControlResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            memory: PidMemory::default(),
        })
    }

    /// Run one sample and keep the updated memory.
    pub fn step(&mut self, setpoint: f64, measurement: f64, dt: f64) -> ControlResult<PidStep> {
        let (memory, step) = self.params.update(&self.memory, setpoint, measurement, dt)?;
        self.memory = memory;
        Ok(step)
    }

    /// Zero the integral, last error and measurement history. Gains are kept.
    pub fn reset(&mut self) {
        self.memory = PidMemory::default();
    }

    pub fn memory(&self) -> &PidMemory {
        &self.memory
    }

    pub fn params(&self) -> &PidParams {
        &self.params
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn output_always_within_limits(
            kp in 0.0_f64..50.0,
            ki in 0.0_f64..10.0,
            kd in 0.0_f64..5.0,
            dt in 0.001_f64..1.0,
            samples in prop::collection::vec((-1.0e4_f64..1.0e4, -1.0e4_f64..1.0e4), 1..50),
        ) {
            let p = PidParams::new(kp, ki, kd, -25.0, 75.0)
                .unwrap()
                .with_integral_limits(-1.0e3, 1.0e3)
                .unwrap();
            let mut pid = PidController::new(p).unwrap();
            for (sp, pv) in samples {
                let step = pid.step(sp, pv, dt).unwrap();
                prop_assert!(step.output >= -25.0 && step.output <= 75.0);
                prop_assert_eq!(step.saturated, step.output != step.raw_output);
                prop_assert!(pid.memory().integral.abs() <= 1.0e3);
            }
        }
    }
}
