//! Offline simulation and the hosted process service.

use pc_core::timing::TimingSummary;
use pc_exchange::{ExchangeResult, ModbusServer, OpcUaServer};
use pc_project::PlantConfig;
use pc_runtime::{LoopExit, ProcessSnapshot, ProcessState, ProcessStatus, RuntimeError, StopReason};
use serde::Serialize;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::compile::{self, CompiledSystem, SimulatedPlant};
use crate::error::{AppError, AppResult};

/// Options for an offline run.
#[derive(Debug, Clone, Default)]
pub struct SimulateOptions {
    pub ticks: u64,
    /// Overrides the configured initial setpoint.
    pub setpoint: Option<f64>,
}

/// One row of a simulation series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickRecord {
    pub tick: u64,
    pub time_s: f64,
    pub setpoint: f64,
    pub measurement: f64,
    pub raw_measurement: f64,
    pub output: f64,
    pub status: ProcessStatus,
    pub fault: Option<String>,
}

impl TickRecord {
    fn new(snapshot: &ProcessSnapshot, dt: f64, fault: Option<String>) -> Self {
        Self {
            tick: snapshot.tick,
            time_s: snapshot.tick as f64 * dt,
            setpoint: snapshot.setpoint,
            measurement: snapshot.measurement,
            raw_measurement: snapshot.raw_measurement,
            output: snapshot.output,
            status: snapshot.status,
            fault,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub records: Vec<TickRecord>,
    /// The run ended early on sensor fault escalation.
    pub escalated: bool,
    pub final_snapshot: ProcessSnapshot,
    pub timing: TimingSummary,
}

/// Run the loop offline for `options.ticks` ticks, as fast as possible.
///
/// Escalation ends the run early and is reported, not returned as an error.
pub fn simulate(config: &PlantConfig, options: &SimulateOptions) -> AppResult<SimulationReport> {
    if options.ticks == 0 {
        return Err(AppError::InvalidInput("ticks must be at least 1".to_string()));
    }
    let CompiledSystem { mut control, state } = compile::compile_system(config)?;
    if let Some(setpoint) = options.setpoint {
        state.write_setpoint(setpoint)?;
    }
    let dt = control.config().dt;

    control.start();
    let mut records = Vec::with_capacity(usize::try_from(options.ticks).unwrap_or(0).min(1 << 20));
    let mut escalated = false;
    for _ in 0..options.ticks {
        match control.tick() {
            Ok(report) => records.push(TickRecord::new(
                &report.snapshot,
                dt,
                report.fault.map(|f| f.to_string()),
            )),
            Err(err @ RuntimeError::SensorFaultEscalation { .. }) => {
                records.push(TickRecord::new(&state.snapshot(), dt, Some(err.to_string())));
                escalated = true;
                break;
            }
            Err(err) => return Err(err.into()),
        }
    }
    if !escalated {
        control.stop(StopReason::Shutdown);
    }

    let timing = control.timing();
    tracing::info!(
        name = %config.name,
        ticks = records.len(),
        escalated,
        avg_tick_us = timing.average_s * 1e6,
        "simulation finished"
    );
    Ok(SimulationReport {
        records,
        escalated,
        final_snapshot: state.snapshot(),
        timing,
    })
}

/// Render a series as CSV with a header row.
pub fn records_to_csv(records: &[TickRecord]) -> String {
    let mut csv = String::from("tick,time_s,setpoint,measurement,raw_measurement,output,status,fault\n");
    for r in records {
        let _ = writeln!(
            csv,
            "{},{},{},{},{},{},{},{}",
            r.tick,
            r.time_s,
            r.setpoint,
            r.measurement,
            r.raw_measurement,
            r.output,
            r.status.as_str(),
            r.fault.as_deref().unwrap_or("").replace(',', ";")
        );
    }
    csv
}

/// How a hosted run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ServeOutcome {
    Shutdown(LoopExit),
    Escalated { consecutive: u32, safe_output: f64 },
}

#[derive(Debug, Clone)]
pub struct ServeReport {
    pub outcome: ServeOutcome,
    pub final_snapshot: ProcessSnapshot,
}

impl ServeReport {
    pub fn escalated(&self) -> bool {
        matches!(self.outcome, ServeOutcome::Escalated { .. })
    }
}

/// Control loop plus its protocol servers, bound and ready to run.
pub struct ProcessService {
    control: pc_runtime::ControlLoop<SimulatedPlant>,
    state: Arc<ProcessState>,
    modbus: Option<ModbusServer>,
    opcua: Option<OpcUaServer>,
}

impl ProcessService {
    /// Compile the config and bind every enabled server.
    pub async fn bind(config: &PlantConfig) -> AppResult<Self> {
        let CompiledSystem { control, state } = compile::compile_system(config)?;

        let modbus = if config.modbus.enabled {
            let cfg = compile::modbus_config(&config.modbus)?;
            Some(ModbusServer::bind(cfg, state.clone()).await?)
        } else {
            None
        };
        let opcua = if config.opcua.enabled {
            let cfg = compile::opcua_config(&config.opcua)?;
            Some(OpcUaServer::bind(cfg, state.clone()).await?)
        } else {
            None
        };

        Ok(Self {
            control,
            state,
            modbus,
            opcua,
        })
    }

    pub fn state(&self) -> &Arc<ProcessState> {
        &self.state
    }

    pub fn modbus_addr(&self) -> Option<SocketAddr> {
        self.modbus.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn opcua_addr(&self) -> Option<SocketAddr> {
        self.opcua.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Run until `shutdown` becomes `true`.
    ///
    /// After a sensor fault escalation the loop stays stopped but the servers
    /// keep serving the stopped state until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> AppResult<ServeReport> {
        let mut servers: JoinSet<ExchangeResult<()>> = JoinSet::new();
        if let Some(server) = self.modbus {
            servers.spawn(server.serve(shutdown.clone()));
        }
        if let Some(server) = self.opcua {
            servers.spawn(server.serve(shutdown.clone()));
        }

        let outcome = match self.control.run(shutdown.clone()).await {
            Ok(exit) => ServeOutcome::Shutdown(exit),
            Err(RuntimeError::SensorFaultEscalation {
                consecutive,
                safe_output,
            }) => {
                tracing::error!(
                    consecutive,
                    safe_output,
                    "control loop stopped on sensor faults; serving state until shutdown"
                );
                wait_for_shutdown(&mut shutdown).await;
                ServeOutcome::Escalated {
                    consecutive,
                    safe_output,
                }
            }
            Err(err) => return Err(err.into()),
        };

        while let Some(joined) = servers.join_next().await {
            joined.map_err(|e| AppError::Exchange(e.to_string()))??;
        }

        Ok(ServeReport {
            outcome,
            final_snapshot: self.state.snapshot(),
        })
    }
}

/// Bind and run in one call.
pub async fn serve(config: &PlantConfig, shutdown: watch::Receiver<bool>) -> AppResult<ServeReport> {
    ProcessService::bind(config).await?.run(shutdown).await
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_has_header_and_one_row_per_record() {
        let record = TickRecord {
            tick: 1,
            time_s: 0.5,
            setpoint: 50.0,
            measurement: 25.5,
            raw_measurement: 25.5,
            output: 12.0,
            status: ProcessStatus::Nominal,
            fault: None,
        };
        let faulted = TickRecord {
            tick: 2,
            status: ProcessStatus::SensorFault,
            fault: Some("a, b".to_string()),
            ..record.clone()
        };
        let csv = records_to_csv(&[record, faulted]);
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("tick,time_s"));
        assert_eq!(lines[1], "1,0.5,50,25.5,25.5,12,Nominal,");
        assert!(lines[2].ends_with("SensorFault,a; b"));
    }

    #[test]
    fn zero_ticks_is_invalid() {
        let err = simulate(
            &PlantConfig::named("zero"),
            &SimulateOptions {
                ticks: 0,
                setpoint: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
