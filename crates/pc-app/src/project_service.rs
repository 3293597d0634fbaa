//! Config loading and introspection.

use pc_project::PlantConfig;
use std::path::Path;

use crate::error::{AppError, AppResult};

/// One-screen description of a config.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSummary {
    pub name: String,
    pub gains: (f64, f64, f64),
    pub output_limits: (f64, f64),
    pub setpoint: f64,
    pub period_s: f64,
    pub fault_threshold: u32,
    pub scheduled_faults: usize,
    pub modbus: Option<String>,
    pub opcua: Option<String>,
}

/// Load (YAML or JSON by extension) and validate a config.
pub fn load_config(path: &Path) -> AppResult<PlantConfig> {
    if !path.exists() {
        return Err(AppError::ConfigFileRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    let config = pc_project::load(path)?;
    tracing::debug!(path = %path.display(), name = %config.name, "config loaded");
    Ok(config)
}

pub fn summarize(config: &PlantConfig) -> ConfigSummary {
    let c = &config.controller;
    ConfigSummary {
        name: config.name.clone(),
        gains: (c.kp, c.ki, c.kd),
        output_limits: (c.out_min, c.out_max),
        setpoint: config.process.setpoint,
        period_s: config.control_loop.period_s,
        fault_threshold: config.control_loop.fault_threshold,
        scheduled_faults: config.faults.len(),
        modbus: config.modbus.enabled.then(|| config.modbus.bind.clone()),
        opcua: config.opcua.enabled.then(|| config.opcua.bind.clone()),
    }
}

/// The effective config (defaults filled in) as YAML.
pub fn render_yaml(config: &PlantConfig) -> AppResult<String> {
    serde_yaml::to_string(config)
        .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))
}
