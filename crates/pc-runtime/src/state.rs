//! Shared process state.
//!
//! One [`ProcessState`] exists per running system. The control loop commits a
//! [`TickUpdate`] once per tick; protocol servers read snapshots and write the
//! setpoint. Both kinds of write go through the same channel, touch disjoint
//! fields, and never hold the channel across I/O.

use crate::error::{RuntimeError, RuntimeResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Classification of the latest tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessStatus {
    /// Valid reading, output within limits.
    Nominal,
    /// Reading rejected; output held at its previous value.
    SensorFault,
    /// Valid reading, output clamped to a limit.
    Saturated,
}

impl ProcessStatus {
    /// Numeric code used by register-based protocols.
    pub fn code(self) -> u16 {
        match self {
            Self::Nominal => 0,
            Self::SensorFault => 1,
            Self::Saturated => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nominal => "Nominal",
            Self::SensorFault => "SensorFault",
            Self::Saturated => "Saturated",
        }
    }
}

/// Run state of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopState {
    Stopped,
    Running,
}

impl LoopState {
    pub fn code(self) -> u16 {
        match self {
            Self::Stopped => 0,
            Self::Running => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running => "Running",
        }
    }
}

/// Why the loop last stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopReason {
    /// Orderly shutdown requested by the operator or the host.
    Shutdown,
    /// Too many consecutive sensor faults; output forced to the safe value.
    SensorFaultEscalation,
    /// A controller or plant error ended the loop.
    Failure,
}

impl StopReason {
    /// Register code; 0 is reserved for "never stopped".
    pub fn code(self) -> u16 {
        match self {
            Self::Shutdown => 1,
            Self::SensorFaultEscalation => 2,
            Self::Failure => 3,
        }
    }
}

/// Immutable copy of the whole process state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    /// Target value; written by operators.
    pub setpoint: f64,
    /// Last validated sensor reading.
    pub measurement: f64,
    /// Last raw reading from the plant, valid or not.
    pub raw_measurement: f64,
    /// Last controller command.
    pub output: f64,
    /// Controller integral accumulator.
    pub integral: f64,
    /// Controller error of the last control step.
    pub last_error: f64,
    pub status: ProcessStatus,
    pub loop_state: LoopState,
    pub stop_reason: Option<StopReason>,
    pub consecutive_faults: u32,
    /// Number of ticks committed since startup.
    pub tick: u64,
    pub last_updated: DateTime<Utc>,
}

impl ProcessSnapshot {
    /// State at startup: zeroed controller internals, loop stopped.
    pub fn initial(setpoint: f64, measurement: f64, output: f64) -> Self {
        Self {
            setpoint,
            measurement,
            raw_measurement: measurement,
            output,
            integral: 0.0,
            last_error: 0.0,
            status: ProcessStatus::Nominal,
            loop_state: LoopState::Stopped,
            stop_reason: None,
            consecutive_faults: 0,
            tick: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn sensor_valid(&self) -> bool {
        self.status != ProcessStatus::SensorFault
    }
}

/// Loop-owned fields written back at the end of a tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickUpdate {
    pub measurement: f64,
    pub raw_measurement: f64,
    pub output: f64,
    pub integral: f64,
    pub last_error: f64,
    pub status: ProcessStatus,
    pub loop_state: LoopState,
    pub stop_reason: Option<StopReason>,
    pub consecutive_faults: u32,
    pub tick: u64,
}

/// Accepted range for external setpoint writes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetpointRange {
    pub min: f64,
    pub max: f64,
}

impl SetpointRange {
    pub fn new(min: f64, max: f64) -> RuntimeResult<Self> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(RuntimeError::InvalidConfig {
                what: format!("setpoint range [{min}, {max}] is not a finite interval"),
            });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Accept `value` or explain why not. Never clamps.
    pub fn check(&self, value: f64) -> RuntimeResult<f64> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(RuntimeError::RejectedWrite {
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// The single shared process state.
///
/// Share it as `Arc<ProcessState>`; all access goes through these methods.
#[derive(Debug)]
pub struct ProcessState {
    tx: watch::Sender<ProcessSnapshot>,
    setpoint_range: SetpointRange,
}

impl ProcessState {
    /// Create the state. The initial setpoint must lie in `setpoint_range`.
    pub fn new(initial: ProcessSnapshot, setpoint_range: SetpointRange) -> RuntimeResult<Self> {
        setpoint_range.check(initial.setpoint)?;
        let (tx, _rx) = watch::channel(initial);
        Ok(Self { tx, setpoint_range })
    }

    /// Consistent copy of every field.
    pub fn snapshot(&self) -> ProcessSnapshot {
        *self.tx.borrow()
    }

    pub fn setpoint(&self) -> f64 {
        self.tx.borrow().setpoint
    }

    pub fn setpoint_range(&self) -> SetpointRange {
        self.setpoint_range
    }

    /// Replace the setpoint. Returns the previous value.
    ///
    /// Values outside the configured range (or not finite) are rejected and
    /// leave the state untouched.
    pub fn write_setpoint(&self, value: f64) -> RuntimeResult<f64> {
        let value = match self.setpoint_range.check(value) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(value, "rejected setpoint write");
                return Err(err);
            }
        };
        let mut previous = value;
        self.tx.send_modify(|s| {
            previous = s.setpoint;
            s.setpoint = value;
        });
        tracing::info!(previous, setpoint = value, "setpoint changed");
        Ok(previous)
    }

    /// Subscribe to every committed change (ticks and setpoint writes).
    pub fn subscribe(&self) -> watch::Receiver<ProcessSnapshot> {
        self.tx.subscribe()
    }

    /// Write back one tick. The setpoint is left alone so a concurrent
    /// operator write is never lost.
    pub fn commit_tick(&self, update: TickUpdate) -> ProcessSnapshot {
        let now = Utc::now();
        let mut committed = None;
        self.tx.send_modify(|s| {
            s.measurement = update.measurement;
            s.raw_measurement = update.raw_measurement;
            s.output = update.output;
            s.integral = update.integral;
            s.last_error = update.last_error;
            s.status = update.status;
            s.loop_state = update.loop_state;
            s.stop_reason = update.stop_reason;
            s.consecutive_faults = update.consecutive_faults;
            s.tick = update.tick;
            s.last_updated = now;
            committed = Some(*s);
        });
        committed.unwrap_or_else(|| self.snapshot())
    }

    /// Record a loop state transition outside a tick.
    pub fn set_loop_state(&self, loop_state: LoopState, stop_reason: Option<StopReason>) {
        self.tx.send_modify(|s| {
            s.loop_state = loop_state;
            s.stop_reason = stop_reason;
            s.last_updated = Utc::now();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ProcessState {
        ProcessState::new(
            ProcessSnapshot::initial(50.0, 25.0, 0.0),
            SetpointRange::new(0.0, 100.0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn initial_snapshot() {
        let snap = state().snapshot();
        assert_eq!(snap.setpoint, 50.0);
        assert_eq!(snap.measurement, 25.0);
        assert_eq!(snap.output, 0.0);
        assert_eq!(snap.integral, 0.0);
        assert_eq!(snap.status, ProcessStatus::Nominal);
        assert_eq!(snap.loop_state, LoopState::Stopped);
        assert_eq!(snap.tick, 0);
        assert!(snap.sensor_valid());
    }

    #[test]
    fn initial_setpoint_must_be_in_range() {
        let err = ProcessState::new(
            ProcessSnapshot::initial(150.0, 0.0, 0.0),
            SetpointRange::new(0.0, 100.0).unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, RuntimeError::RejectedWrite { value, .. } if value == 150.0));
    }

    #[test]
    fn accepted_write_returns_previous() {
        let s = state();
        assert_eq!(s.write_setpoint(72.5), Ok(50.0));
        assert_eq!(s.setpoint(), 72.5);
        // Range ends are accepted
        assert!(s.write_setpoint(0.0).is_ok());
        assert!(s.write_setpoint(100.0).is_ok());
    }

    #[test]
    fn rejected_write_leaves_state_unchanged() {
        let s = state();
        let before = s.snapshot();
        assert_eq!(
            s.write_setpoint(1e9),
            Err(RuntimeError::RejectedWrite {
                value: 1e9,
                min: 0.0,
                max: 100.0
            })
        );
        assert!(s.write_setpoint(-0.01).is_err());
        assert!(s.write_setpoint(f64::NAN).is_err());
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn commit_keeps_setpoint() {
        let s = state();
        s.write_setpoint(60.0).unwrap();
        let committed = s.commit_tick(TickUpdate {
            measurement: 30.0,
            raw_measurement: 30.0,
            output: 12.0,
            integral: 1.5,
            last_error: 30.0,
            status: ProcessStatus::Saturated,
            loop_state: LoopState::Running,
            stop_reason: None,
            consecutive_faults: 0,
            tick: 1,
        });
        assert_eq!(committed.setpoint, 60.0);
        assert_eq!(committed.output, 12.0);
        assert_eq!(committed.status, ProcessStatus::Saturated);
        assert_eq!(s.snapshot(), committed);
    }

    #[test]
    fn subscribers_see_changes() {
        let s = state();
        let mut rx = s.subscribe();
        assert!(!rx.has_changed().unwrap());
        s.write_setpoint(10.0).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().setpoint, 10.0);
    }

    #[test]
    fn status_codes() {
        assert_eq!(ProcessStatus::Nominal.code(), 0);
        assert_eq!(ProcessStatus::SensorFault.code(), 1);
        assert_eq!(ProcessStatus::Saturated.code(), 2);
        assert_eq!(LoopState::Running.code(), 1);
        assert_eq!(StopReason::SensorFaultEscalation.code(), 2);
        assert_eq!(StopReason::Failure.code(), 3);
        assert_eq!(ProcessStatus::SensorFault.as_str(), "SensorFault");
    }

    #[test]
    fn setpoint_range_validation() {
        assert!(SetpointRange::new(10.0, 0.0).is_err());
        assert!(SetpointRange::new(f64::NAN, 1.0).is_err());
        let r = SetpointRange::new(-5.0, 5.0).unwrap();
        assert!(r.contains(-5.0) && r.contains(5.0));
        assert!(!r.contains(5.5));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn write_accepted_only_inside_range(value in -500.0f64..500.0) {
            let state = ProcessState::new(
                ProcessSnapshot::initial(0.0, 0.0, 0.0),
                SetpointRange::new(-100.0, 100.0).unwrap(),
            )
            .unwrap();
            let accepted = state.write_setpoint(value).is_ok();
            prop_assert_eq!(accepted, (-100.0..=100.0).contains(&value));
            let expected = if accepted { value } else { 0.0 };
            prop_assert_eq!(state.setpoint(), expected);
        }
    }
}
