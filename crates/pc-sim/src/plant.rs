//! Plant trait for pluggable process models.

use crate::error::SimResult;

/// A simulated physical process.
///
/// Implementations must be deterministic given the sequence of `advance`
/// calls and their own construction parameters (including any seed).
pub trait Plant: Send {
    /// Current true process value.
    fn measurement(&self) -> f64;

    /// Apply `output` for `dt` seconds and return the next raw sensor reading.
    ///
    /// The reading may differ from [`Plant::measurement`] (noise, injected
    /// faults); the controller only ever sees the reading.
    fn advance(&mut self, output: f64, dt: f64) -> SimResult<f64>;
}

impl<P: Plant + ?Sized> Plant for Box<P> {
    fn measurement(&self) -> f64 {
        (**self).measurement()
    }

    fn advance(&mut self, output: f64, dt: f64) -> SimResult<f64> {
        (**self).advance(output, dt)
    }
}
