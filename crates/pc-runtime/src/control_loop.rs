//! Control loop scheduler.
//!
//! Per tick, in order:
//! 1. read setpoint and last measurement from [`ProcessState`]
//! 2. advance the plant with the previous output
//! 3. validate the raw reading
//! 4. on a valid reading run the PID step, otherwise hold the output
//! 5. commit the result to [`ProcessState`] in one write
//!
//! A run of `fault_threshold` consecutive invalid readings forces the output
//! to the safe value and stops the loop.

use crate::error::{RuntimeError, RuntimeResult};
use crate::state::{LoopState, ProcessSnapshot, ProcessState, ProcessStatus, StopReason, TickUpdate};
use pc_controls::{PidController, SampleConfig, SensorValidator, ValidationError};
use pc_core::timing::{AccumulatingTimer, Timer, TimingSummary};
use pc_sim::Plant;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Loop scheduling and fail-safe settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Tick period in seconds.
    pub dt: f64,
    /// Consecutive sensor faults that stop the loop.
    pub fault_threshold: u32,
    /// Output commanded when the loop stops on sensor faults.
    pub safe_output: f64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            dt: 0.5,
            fault_threshold: 3,
            safe_output: 0.0,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    /// State as committed by this tick.
    pub snapshot: ProcessSnapshot,
    /// Reason the reading was rejected, if it was.
    pub fault: Option<ValidationError>,
}

/// Summary returned when the loop stops cleanly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopExit {
    pub ticks: u64,
    pub reason: StopReason,
    /// Compute time per tick, excluding the wait for the next period.
    pub timing: TimingSummary,
}

/// The periodic control task.
///
/// Owns the controller and the plant; shares only [`ProcessState`].
pub struct ControlLoop<P> {
    config: LoopConfig,
    sample: SampleConfig,
    controller: PidController,
    validator: SensorValidator,
    plant: P,
    state: Arc<ProcessState>,
    output: f64,
    consecutive_faults: u32,
    ticks: u64,
    loop_state: LoopState,
    tick_timer: AccumulatingTimer,
}

impl<P: Plant> ControlLoop<P> {
    /// Assemble a loop. Nothing runs until [`ControlLoop::start`] or
    /// [`ControlLoop::run`].
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::InvalidInterval`] if `config.dt` is not positive
    /// - [`RuntimeError::InvalidConfig`] for a zero fault threshold or a safe
    ///   output outside the controller's output limits
    pub fn new(
        config: LoopConfig,
        controller: PidController,
        validator: SensorValidator,
        plant: P,
        state: Arc<ProcessState>,
    ) -> RuntimeResult<Self> {
        let sample =
            SampleConfig::new(config.dt).map_err(|_| RuntimeError::InvalidInterval { dt: config.dt })?;
        if config.fault_threshold == 0 {
            return Err(RuntimeError::InvalidConfig {
                what: "fault_threshold must be at least 1".to_string(),
            });
        }
        let params = controller.params();
        if !(config.safe_output >= params.out_min && config.safe_output <= params.out_max) {
            return Err(RuntimeError::InvalidConfig {
                what: format!(
                    "safe_output {} outside output limits [{}, {}]",
                    config.safe_output, params.out_min, params.out_max
                ),
            });
        }

        let snapshot = state.snapshot();
        Ok(Self {
            config,
            sample,
            controller,
            validator,
            plant,
            output: snapshot.output,
            ticks: snapshot.tick,
            state,
            consecutive_faults: 0,
            loop_state: LoopState::Stopped,
            tick_timer: AccumulatingTimer::new(),
        })
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    pub fn controller(&self) -> &PidController {
        &self.controller
    }

    pub fn plant(&self) -> &P {
        &self.plant
    }

    pub fn state(&self) -> &Arc<ProcessState> {
        &self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn timing(&self) -> TimingSummary {
        self.tick_timer.summary()
    }

    /// Transition to `Running`. Starting after a fault stop begins with a
    /// clean controller.
    pub fn start(&mut self) {
        if self.loop_state == LoopState::Running {
            return;
        }
        if self.consecutive_faults > 0 {
            self.controller.reset();
            self.consecutive_faults = 0;
        }
        self.loop_state = LoopState::Running;
        self.state.set_loop_state(LoopState::Running, None);
        tracing::info!(dt = self.sample.dt, "control loop started");
    }

    /// Transition to `Stopped` between ticks.
    pub fn stop(&mut self, reason: StopReason) {
        if self.loop_state == LoopState::Stopped {
            return;
        }
        self.loop_state = LoopState::Stopped;
        self.state.set_loop_state(LoopState::Stopped, Some(reason));
        tracing::info!(ticks = self.ticks, ?reason, "control loop stopped");
    }

    /// Execute one tick.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::NotRunning`] if the loop is stopped
    /// - [`RuntimeError::SensorFaultEscalation`] when this tick reaches the
    ///   fault threshold; the loop is stopped and the safe output committed
    /// - controller or plant errors; the loop is stopped with
    ///   [`StopReason::Failure`]
    pub fn tick(&mut self) -> RuntimeResult<TickReport> {
        if self.loop_state != LoopState::Running {
            return Err(RuntimeError::NotRunning);
        }
        let timer = Timer::start();
        let result = self.tick_inner();
        self.tick_timer.record(timer.stop());

        match &result {
            Ok(_) | Err(RuntimeError::SensorFaultEscalation { .. }) => {}
            Err(err) => {
                tracing::error!(tick = self.ticks + 1, %err, "tick failed");
                self.stop(StopReason::Failure);
            }
        }
        result
    }

    fn tick_inner(&mut self) -> RuntimeResult<TickReport> {
        let dt = self.sample.dt;
        let ProcessSnapshot {
            setpoint,
            measurement: previous,
            ..
        } = self.state.snapshot();

        let raw = self.plant.advance(self.output, dt)?;
        let tick = self.ticks + 1;

        // Rate is judged over the time since the last accepted reading
        let since_valid = dt * f64::from(self.consecutive_faults + 1);

        match self.validator.validate(raw, previous, since_valid) {
            Err(fault) => {
                self.ticks = tick;
                self.consecutive_faults += 1;
                let memory = *self.controller.memory();

                if self.consecutive_faults >= self.config.fault_threshold {
                    self.output = self.config.safe_output;
                    self.loop_state = LoopState::Stopped;
                    self.state.commit_tick(TickUpdate {
                        measurement: previous,
                        raw_measurement: raw,
                        output: self.output,
                        integral: memory.integral,
                        last_error: memory.last_error,
                        status: ProcessStatus::SensorFault,
                        loop_state: LoopState::Stopped,
                        stop_reason: Some(StopReason::SensorFaultEscalation),
                        consecutive_faults: self.consecutive_faults,
                        tick,
                    });
                    tracing::error!(
                        tick,
                        consecutive = self.consecutive_faults,
                        safe_output = self.output,
                        %fault,
                        "sensor fault escalation, loop stopped"
                    );
                    return Err(RuntimeError::SensorFaultEscalation {
                        consecutive: self.consecutive_faults,
                        safe_output: self.output,
                    });
                }

                tracing::warn!(
                    tick,
                    consecutive = self.consecutive_faults,
                    raw,
                    %fault,
                    "sensor fault, holding output"
                );
                let snapshot = self.state.commit_tick(TickUpdate {
                    measurement: previous,
                    raw_measurement: raw,
                    output: self.output,
                    integral: memory.integral,
                    last_error: memory.last_error,
                    status: ProcessStatus::SensorFault,
                    loop_state: LoopState::Running,
                    stop_reason: None,
                    consecutive_faults: self.consecutive_faults,
                    tick,
                });
                Ok(TickReport {
                    snapshot,
                    fault: Some(fault),
                })
            }
            Ok(measurement) => {
                if self.consecutive_faults > 0 {
                    tracing::info!(
                        tick,
                        after = self.consecutive_faults,
                        "sensor recovered, controller reset"
                    );
                    self.controller.reset();
                    self.consecutive_faults = 0;
                }

                let step = self.controller.step(setpoint, measurement, dt)?;
                self.ticks = tick;
                self.output = step.output;
                let memory = *self.controller.memory();
                let status = if step.saturated {
                    ProcessStatus::Saturated
                } else {
                    ProcessStatus::Nominal
                };

                let snapshot = self.state.commit_tick(TickUpdate {
                    measurement,
                    raw_measurement: raw,
                    output: step.output,
                    integral: memory.integral,
                    last_error: memory.last_error,
                    status,
                    loop_state: LoopState::Running,
                    stop_reason: None,
                    consecutive_faults: 0,
                    tick,
                });
                tracing::trace!(tick, setpoint, measurement, output = step.output, "tick");
                Ok(TickReport {
                    snapshot,
                    fault: None,
                })
            }
        }
    }

    /// Tick every `dt` until `shutdown` becomes `true` (or its sender is
    /// dropped). Shutdown is only observed between ticks.
    ///
    /// # Errors
    ///
    /// Returns the first tick error; [`RuntimeError::SensorFaultEscalation`]
    /// is the expected fatal case.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> RuntimeResult<LoopExit> {
        self.start();

        let mut interval = tokio::time::interval(self.sample.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First interval tick completes immediately
        interval.tick().await;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.tick()?;
                }
            }
        }

        self.stop(StopReason::Shutdown);
        let timing = self.timing();
        tracing::info!(
            ticks = self.ticks,
            avg_tick_ms = timing.average_s * 1e3,
            max_tick_ms = timing.max_s * 1e3,
            "control loop exited"
        );
        Ok(LoopExit {
            ticks: self.ticks,
            reason: StopReason::Shutdown,
            timing,
        })
    }
}
