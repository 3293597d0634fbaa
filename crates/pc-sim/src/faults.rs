//! Scheduled sensor fault injection.
//!
//! Wraps any [`Plant`] and replaces the raw reading on chosen ticks, e.g. a
//! spike out of the valid range or a frozen/NaN value. The wrapped plant keeps
//! evolving underneath, the same way a real process does while its sensor
//! misbehaves.

use crate::error::SimResult;
use crate::plant::Plant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One injected reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFault {
    /// 1-based tick number (count of `advance` calls) to override.
    pub tick: u64,
    /// Reading reported instead of the true value.
    pub value: f64,
}

/// Plant wrapper that overrides readings on scheduled ticks.
#[derive(Debug, Clone)]
pub struct FaultInjector<P> {
    inner: P,
    schedule: BTreeMap<u64, f64>,
    ticks: u64,
}

impl<P: Plant> FaultInjector<P> {
    pub fn new(inner: P, faults: impl IntoIterator<Item = ScheduledFault>) -> Self {
        Self {
            inner,
            schedule: faults.into_iter().map(|f| (f.tick, f.value)).collect(),
            ticks: 0,
        }
    }

    /// Number of `advance` calls seen so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Faults not yet reached.
    pub fn pending(&self) -> usize {
        self.schedule.range(self.ticks + 1..).count()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Plant> Plant for FaultInjector<P> {
    fn measurement(&self) -> f64 {
        self.inner.measurement()
    }

    fn advance(&mut self, output: f64, dt: f64) -> SimResult<f64> {
        let reading = self.inner.advance(output, dt)?;
        self.ticks += 1;
        match self.schedule.get(&self.ticks) {
            Some(&value) => {
                tracing::debug!(tick = self.ticks, value, "injecting sensor fault");
                Ok(value)
            }
            None => Ok(reading),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::first_order::{FirstOrderParams, FirstOrderPlant};

    fn plant() -> FirstOrderPlant {
        FirstOrderPlant::new(
            FirstOrderParams {
                gain: 1.0,
                time_constant: 5.0,
            },
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn overrides_only_scheduled_ticks() {
        let mut injected = FaultInjector::new(
            plant(),
            [
                ScheduledFault {
                    tick: 2,
                    value: 999.0,
                },
                ScheduledFault {
                    tick: 4,
                    value: f64::NAN,
                },
            ],
        );
        let mut reference = plant();
        assert_eq!(injected.pending(), 2);

        for tick in 1..=5u64 {
            let reading = injected.advance(10.0, 0.1).unwrap();
            let truth = reference.advance(10.0, 0.1).unwrap();
            match tick {
                2 => assert_eq!(reading, 999.0),
                4 => assert!(reading.is_nan()),
                _ => assert_eq!(reading, truth),
            }
            // The underlying process is unaffected
            assert_eq!(injected.measurement(), truth);
        }

        assert_eq!(injected.ticks(), 5);
        assert_eq!(injected.pending(), 0);
    }

    #[test]
    fn errors_from_inner_plant_propagate() {
        let mut injected = FaultInjector::new(plant(), Vec::<ScheduledFault>::new());
        assert!(injected.advance(1.0, 0.0).is_err());
        assert_eq!(injected.ticks(), 0);
    }
}
