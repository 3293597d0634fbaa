//! Build runtime objects from a validated config.

use pc_controls::{PidController, PidParams, SensorLimits, SensorValidator};
use pc_exchange::modbus::{DeviceIdentity, RegisterMap};
use pc_exchange::{ModbusConfig, OpcUaConfig};
use pc_project::schema::{ControllerDef, ModbusDef, OpcUaDef, PlantConfig, PlantDef, SensorDef};
use pc_runtime::{ControlLoop, LoopConfig, ProcessSnapshot, ProcessState, SetpointRange};
use pc_sim::{DisturbanceConfig, FaultInjector, FirstOrderParams, FirstOrderPlant, ScheduledFault};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Plant used by every compiled system.
pub type SimulatedPlant = FaultInjector<FirstOrderPlant>;

/// A control loop wired to its shared state, not yet running.
pub struct CompiledSystem {
    pub control: ControlLoop<SimulatedPlant>,
    pub state: Arc<ProcessState>,
}

pub fn build_controller(def: &ControllerDef) -> AppResult<PidController> {
    let mut params = PidParams::new(def.kp, def.ki, def.kd, def.out_min, def.out_max)?;
    if let Some(limits) = def.integral_limits {
        params = params.with_integral_limits(limits.min, limits.max)?;
    }
    Ok(PidController::new(params)?)
}

pub fn build_validator(def: &SensorDef) -> AppResult<SensorValidator> {
    Ok(SensorValidator::new(SensorLimits {
        min_valid: def.min_valid,
        max_valid: def.max_valid,
        max_rate_of_change: def.max_rate_of_change,
    })?)
}

pub fn build_plant(
    def: &PlantDef,
    faults: impl IntoIterator<Item = ScheduledFault>,
) -> AppResult<SimulatedPlant> {
    let params = FirstOrderParams {
        gain: def.gain,
        time_constant: def.time_constant_s,
    };
    let mut plant = FirstOrderPlant::new(params, def.initial_measurement)?;
    if let Some(d) = def.disturbance {
        plant = plant.with_disturbance(DisturbanceConfig {
            amplitude: d.amplitude,
            seed: d.seed,
        })?;
    }
    Ok(FaultInjector::new(plant, faults))
}

/// Compile a config into a stopped control loop and its state.
///
/// The config is validated again here so hand-built configs get the same
/// checks as loaded ones.
pub fn compile_system(config: &PlantConfig) -> AppResult<CompiledSystem> {
    pc_project::validate_config(config).map_err(|e| AppError::Config(e.to_string()))?;

    let controller = build_controller(&config.controller)?;
    let validator = build_validator(&config.sensor)?;
    let faults = config.faults.iter().map(|f| ScheduledFault {
        tick: f.tick,
        value: f.value,
    });
    let plant = build_plant(&config.plant, faults)?;

    let limits = config.process.setpoint_limits;
    let state = Arc::new(ProcessState::new(
        ProcessSnapshot::initial(config.process.setpoint, config.plant.initial_measurement, 0.0),
        SetpointRange::new(limits.min, limits.max)?,
    )?);

    let loop_config = LoopConfig {
        dt: config.control_loop.period_s,
        fault_threshold: config.control_loop.fault_threshold,
        safe_output: config.control_loop.safe_output,
    };
    let control = ControlLoop::new(loop_config, controller, validator, plant, state.clone())?;

    tracing::debug!(name = %config.name, dt = loop_config.dt, "system compiled");
    Ok(CompiledSystem { control, state })
}

fn parse_bind(field: &str, addr: &str) -> AppResult<SocketAddr> {
    addr.parse()
        .map_err(|_| AppError::InvalidInput(format!("{field}: '{addr}' is not an IP socket address")))
}

pub fn modbus_config(def: &ModbusDef) -> AppResult<ModbusConfig> {
    Ok(ModbusConfig {
        bind: parse_bind("modbus.bind", &def.bind)?,
        map: RegisterMap::new(def.base_address, def.scale)?,
        request_timeout: Duration::from_millis(def.request_timeout_ms),
        identity: DeviceIdentity {
            vendor_name: def.vendor_name.clone(),
            product_code: def.product_code.clone(),
            revision: def.revision.clone(),
        },
    })
}

pub fn opcua_config(def: &OpcUaDef) -> AppResult<OpcUaConfig> {
    Ok(OpcUaConfig {
        bind: parse_bind("opcua.bind", &def.bind)?,
        namespace_uri: def.namespace_uri.clone(),
        session_timeout: Duration::from_millis(def.session_timeout_ms),
        request_timeout: Duration::from_millis(def.request_timeout_ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pc_project::schema::{FaultDef, RangeDef};
    use pc_runtime::LoopState;

    #[test]
    fn compiles_defaults() {
        let system = compile_system(&PlantConfig::named("defaults")).unwrap();
        let snap = system.state.snapshot();
        assert_eq!(snap.setpoint, 50.0);
        assert_eq!(snap.measurement, 25.0);
        assert_eq!(snap.loop_state, LoopState::Stopped);
        assert_eq!(system.control.config().dt, 0.5);
        assert_eq!(system.control.controller().params().out_max, 1000.0);
    }

    #[test]
    fn integral_limits_and_faults_are_wired() {
        let mut config = PlantConfig::named("wired");
        config.controller.integral_limits = Some(RangeDef {
            min: -5.0,
            max: 5.0,
        });
        config.faults = vec![FaultDef {
            tick: 4,
            value: 999.0,
        }];
        let system = compile_system(&config).unwrap();
        assert_eq!(system.control.controller().params().integral_max, 5.0);
        assert_eq!(system.control.plant().pending(), 1);
    }

    #[test]
    fn invalid_config_fails_before_building() {
        let mut config = PlantConfig::named("bad");
        config.control_loop.safe_output = 1e6;
        assert!(matches!(compile_system(&config), Err(AppError::Config(_))));
    }

    #[test]
    fn protocol_configs() {
        let modbus = modbus_config(&ModbusDef::default()).unwrap();
        assert_eq!(modbus.bind.port(), 5020);
        assert_eq!(modbus.map.scale(), 10.0);
        assert_eq!(modbus.request_timeout, Duration::from_secs(5));

        let opcua = opcua_config(&OpcUaDef::default()).unwrap();
        assert_eq!(opcua.bind.port(), 4841);
        assert_eq!(opcua.namespace_uri, "urn:pc:process-control");

        let bad = ModbusDef {
            bind: "nowhere".to_string(),
            ..ModbusDef::default()
        };
        assert!(matches!(modbus_config(&bad), Err(AppError::InvalidInput(_))));
    }
}
