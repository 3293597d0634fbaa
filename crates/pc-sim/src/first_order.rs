//! First-order lag plant.
//!
//! Dynamics: `dm/dt = (gain * output - m) / time_constant`, integrated with
//! explicit Euler at the loop period. This captures the dominant behaviour of
//! most thermal and flow processes:
//! - **Static gain**: steady-state value per unit of output
//! - **Time constant**: how quickly the process follows the command
//! - **Disturbance**: optional bounded random load change per tick

use crate::error::{SimError, SimResult};
use crate::plant::Plant;
use pc_core::ensure_finite;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Parameters of a first-order plant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FirstOrderParams {
    /// Steady-state measurement per unit of output.
    pub gain: f64,
    /// Time constant in seconds, must be positive.
    pub time_constant: f64,
}

impl FirstOrderParams {
    pub fn validate(&self) -> SimResult<()> {
        ensure_finite(self.gain, "gain")?;
        ensure_finite(self.time_constant, "time_constant")?;
        if self.time_constant <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "time_constant must be positive",
            });
        }
        Ok(())
    }
}

/// Bounded uniform disturbance, reproducible from its seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisturbanceConfig {
    /// Largest absolute disturbance added per tick.
    pub amplitude: f64,
    /// Seed of the disturbance generator.
    pub seed: u64,
}

#[derive(Debug, Clone)]
struct Disturbance {
    amplitude: f64,
    rng: ChaCha8Rng,
}

impl Disturbance {
    fn sample(&mut self) -> f64 {
        if self.amplitude == 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-self.amplitude..=self.amplitude)
    }
}

/// First-order lag process with optional disturbance.
///
/// # Example
///
/// ```
/// use pc_sim::{FirstOrderParams, FirstOrderPlant, Plant};
///
/// let params = FirstOrderParams { gain: 1.0, time_constant: 5.0 };
/// let mut plant = FirstOrderPlant::new(params, 0.0).unwrap();
///
/// // Hold the output at 50 for 30 seconds
/// for _ in 0..300 {
///     plant.advance(50.0, 0.1).unwrap();
/// }
///
/// // Six time constants: within a fraction of a percent of 50
/// assert!((plant.measurement() - 50.0).abs() < 0.5);
/// ```
#[derive(Debug, Clone)]
pub struct FirstOrderPlant {
    params: FirstOrderParams,
    measurement: f64,
    disturbance: Option<Disturbance>,
}

impl FirstOrderPlant {
    /// Create a plant at rest at `initial_measurement`.
    ///
    /// # Errors
    ///
    /// Returns error if `time_constant` is not positive or a value is not finite.
    pub fn new(params: FirstOrderParams, initial_measurement: f64) -> SimResult<Self> {
        params.validate()?;
        ensure_finite(initial_measurement, "initial_measurement")?;
        Ok(Self {
            params,
            measurement: initial_measurement,
            disturbance: None,
        })
    }

    /// Add a seeded disturbance bounded by `config.amplitude`.
    pub fn with_disturbance(mut self, config: DisturbanceConfig) -> SimResult<Self> {
        ensure_finite(config.amplitude, "disturbance amplitude")?;
        if config.amplitude < 0.0 {
            return Err(SimError::InvalidArg {
                what: "disturbance amplitude must be non-negative",
            });
        }
        self.disturbance = Some(Disturbance {
            amplitude: config.amplitude,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
        });
        Ok(self)
    }

    pub fn params(&self) -> &FirstOrderParams {
        &self.params
    }

    /// Compute the measurement derivative for a given output.
    pub fn dmdt(&self, measurement: f64, output: f64) -> f64 {
        (output * self.params.gain - measurement) / self.params.time_constant
    }
}

impl Plant for FirstOrderPlant {
    fn measurement(&self) -> f64 {
        self.measurement
    }

    fn advance(&mut self, output: f64, dt: f64) -> SimResult<f64> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(SimError::InvalidArg {
                what: "dt must be positive",
            });
        }
        if dt > self.params.time_constant {
            return Err(SimError::NonPhysical {
                what: "dt exceeds the time constant; explicit Euler would overshoot",
            });
        }
        ensure_finite(output, "output")?;

        let mut next = self.measurement + self.dmdt(self.measurement, output) * dt;
        if let Some(disturbance) = self.disturbance.as_mut() {
            next += disturbance.sample();
        }
        self.measurement = next;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FirstOrderParams {
        FirstOrderParams {
            gain: 1.0,
            time_constant: 5.0,
        }
    }

    #[test]
    fn single_step_follows_lag_equation() {
        let mut plant = FirstOrderPlant::new(params(), 10.0).unwrap();
        let next = plant.advance(60.0, 0.1).unwrap();
        // 10 + (60 - 10) / 5 * 0.1 = 11
        assert!((next - 11.0).abs() < 1e-12);
        assert_eq!(plant.measurement(), next);
    }

    #[test]
    fn zero_output_decays_toward_zero() {
        let mut plant = FirstOrderPlant::new(params(), 100.0).unwrap();
        let mut last = plant.measurement();
        for _ in 0..50 {
            let next = plant.advance(0.0, 0.1).unwrap();
            assert!(next < last);
            assert!(next > 0.0);
            last = next;
        }
    }

    #[test]
    fn gain_scales_steady_state() {
        let p = FirstOrderParams {
            gain: 2.0,
            time_constant: 1.0,
        };
        let mut plant = FirstOrderPlant::new(p, 0.0).unwrap();
        for _ in 0..1000 {
            plant.advance(10.0, 0.05).unwrap();
        }
        assert!((plant.measurement() - 20.0).abs() < 1e-6);
    }

    #[test]
    fn seeded_disturbance_is_reproducible_and_bounded() {
        let dist = DisturbanceConfig {
            amplitude: 0.25,
            seed: 42,
        };
        let mut a = FirstOrderPlant::new(params(), 20.0)
            .unwrap()
            .with_disturbance(dist)
            .unwrap();
        let mut b = FirstOrderPlant::new(params(), 20.0)
            .unwrap()
            .with_disturbance(dist)
            .unwrap();
        for _ in 0..100 {
            let ra = a.advance(30.0, 0.1).unwrap();
            let rb = b.advance(30.0, 0.1).unwrap();
            assert_eq!(ra, rb);
        }

        let mut one = FirstOrderPlant::new(params(), 20.0)
            .unwrap()
            .with_disturbance(dist)
            .unwrap();
        let undisturbed = 20.0 + (30.0 - 20.0) / 5.0 * 0.1;
        let reading = one.advance(30.0, 0.1).unwrap();
        assert!((reading - undisturbed).abs() <= 0.25);
    }

    #[test]
    fn invalid_arguments() {
        assert!(
            FirstOrderPlant::new(
                FirstOrderParams {
                    gain: 1.0,
                    time_constant: 0.0
                },
                0.0
            )
            .is_err()
        );
        let mut plant = FirstOrderPlant::new(params(), 0.0).unwrap();
        assert!(plant.advance(1.0, 0.0).is_err());
        assert!(plant.advance(1.0, -0.1).is_err());
        assert!(matches!(
            plant.advance(1.0, 10.0),
            Err(SimError::NonPhysical { .. })
        ));
        assert!(plant.advance(f64::NAN, 0.1).is_err());
        assert!(
            FirstOrderPlant::new(params(), 0.0)
                .unwrap()
                .with_disturbance(DisturbanceConfig {
                    amplitude: -1.0,
                    seed: 1
                })
                .is_err()
        );
    }
}
