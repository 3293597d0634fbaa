//! Configuration schema.
//!
//! Every section except `version` and `name` may be omitted; missing
//! sections and fields take the defaults below.

use serde::{Deserialize, Serialize};

/// Newest schema version this crate reads.
pub const CURRENT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlantConfig {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub controller: ControllerDef,
    #[serde(default)]
    pub sensor: SensorDef,
    #[serde(default)]
    pub control_loop: LoopDef,
    #[serde(default)]
    pub plant: PlantDef,
    #[serde(default)]
    pub process: ProcessDef,
    #[serde(default)]
    pub modbus: ModbusDef,
    #[serde(default)]
    pub opcua: OpcUaDef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<FaultDef>,
}

impl PlantConfig {
    /// A config with every section at its default.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            version: CURRENT_VERSION,
            name: name.into(),
            controller: ControllerDef::default(),
            sensor: SensorDef::default(),
            control_loop: LoopDef::default(),
            plant: PlantDef::default(),
            process: ProcessDef::default(),
            modbus: ModbusDef::default(),
            opcua: OpcUaDef::default(),
            faults: Vec::new(),
        }
    }
}

/// PID gains and limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControllerDef {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub out_min: f64,
    pub out_max: f64,
    /// Anti-windup bounds on the integral accumulator; unbounded if absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integral_limits: Option<RangeDef>,
}

impl Default for ControllerDef {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.2,
            kd: 0.05,
            out_min: -1000.0,
            out_max: 1000.0,
            integral_limits: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RangeDef {
    pub min: f64,
    pub max: f64,
}

/// Plausibility limits for raw readings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SensorDef {
    pub min_valid: f64,
    pub max_valid: f64,
    /// Units per second.
    pub max_rate_of_change: f64,
}

impl Default for SensorDef {
    fn default() -> Self {
        Self {
            min_valid: 0.0,
            max_valid: 200.0,
            max_rate_of_change: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopDef {
    pub period_s: f64,
    pub fault_threshold: u32,
    pub safe_output: f64,
}

impl Default for LoopDef {
    fn default() -> Self {
        Self {
            period_s: 0.5,
            fault_threshold: 3,
            safe_output: 0.0,
        }
    }
}

/// Simulated first-order process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlantDef {
    pub gain: f64,
    pub time_constant_s: f64,
    pub initial_measurement: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disturbance: Option<DisturbanceDef>,
}

impl Default for PlantDef {
    fn default() -> Self {
        Self {
            gain: 1.0,
            time_constant_s: 5.0,
            initial_measurement: 25.0,
            disturbance: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DisturbanceDef {
    pub amplitude: f64,
    #[serde(default)]
    pub seed: u64,
}

/// Initial setpoint and the range operators may write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessDef {
    pub setpoint: f64,
    pub setpoint_limits: RangeDef,
}

impl Default for ProcessDef {
    fn default() -> Self {
        Self {
            setpoint: 50.0,
            setpoint_limits: RangeDef {
                min: 0.0,
                max: 200.0,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModbusDef {
    pub enabled: bool,
    pub bind: String,
    pub base_address: u16,
    /// Fixed-point factor for analog registers. Setpoint, sensor and output
    /// ranges times this factor must fit in an `i16`.
    pub scale: f64,
    pub request_timeout_ms: u64,
    pub vendor_name: String,
    pub product_code: String,
    pub revision: String,
}

impl Default for ModbusDef {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:5020".to_string(),
            base_address: 0,
            scale: 10.0,
            request_timeout_ms: 5000,
            vendor_name: "pc-process-control".to_string(),
            product_code: "PC-PID".to_string(),
            revision: "1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpcUaDef {
    pub enabled: bool,
    pub bind: String,
    pub namespace_uri: String,
    pub session_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for OpcUaDef {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:4841".to_string(),
            namespace_uri: "urn:pc:process-control".to_string(),
            session_timeout_ms: 60_000,
            request_timeout_ms: 5000,
        }
    }
}

/// Reading substituted for the true measurement on one tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FaultDef {
    /// 1-based tick number.
    pub tick: u64,
    pub value: f64,
}
