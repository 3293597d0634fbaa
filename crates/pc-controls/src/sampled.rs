//! Sample period of the control loop.
//!
//! The loop runs in sampled/digital mode: one controller update per period,
//! output held constant in between (zero-order hold).

use crate::error::{ControlError, ControlResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sample configuration for the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SampleConfig {
    /// Sample period in seconds.
    pub dt: f64,
}

impl SampleConfig {
    /// Create a new sample configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidInterval`] if `dt` is not positive and finite.
    pub fn new(dt: f64) -> ControlResult<Self> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(ControlError::InvalidInterval { dt });
        }
        Ok(Self { dt })
    }

    /// Sample period as a wall-clock duration.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_config_creation() {
        let config = SampleConfig::new(0.1).unwrap();
        assert_eq!(config.dt, 0.1);
        assert_eq!(config.period(), Duration::from_millis(100));
    }

    #[test]
    fn non_positive_period_is_rejected() {
        assert_eq!(
            SampleConfig::new(0.0),
            Err(ControlError::InvalidInterval { dt: 0.0 })
        );
        assert!(SampleConfig::new(-1.0).is_err());
        assert!(SampleConfig::new(f64::INFINITY).is_err());
    }
}
