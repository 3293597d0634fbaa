use pc_project::{PlantConfig, ProjectError, load, load_yaml};
use std::path::Path;

fn configs_dir() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../configs")
}

#[test]
fn shipped_configs_load_and_validate() {
    for name in ["plant.yaml", "sensor_faults.yaml"] {
        let path = configs_dir().join(name);
        load(&path).unwrap_or_else(|e| panic!("Failed to load {}: {}", name, e));
    }
}

#[test]
fn plant_config_values() {
    let config = load_yaml(&configs_dir().join("plant.yaml")).unwrap();
    assert_eq!(config.controller.kp, 1.0);
    assert_eq!(config.controller.ki, 0.2);
    assert_eq!(config.controller.kd, 0.05);
    assert_eq!(config.process.setpoint, 50.0);
    assert_eq!(config.process.setpoint_limits.max, 150.0);
    assert_eq!(config.plant.disturbance.unwrap().seed, 7);
    // Omitted fields fall back to defaults
    assert_eq!(config.opcua.session_timeout_ms, 60_000);
    assert_eq!(config.modbus.product_code, "PC-PID");
}

#[test]
fn fault_schedule_accepts_nan() {
    let config = load_yaml(&configs_dir().join("sensor_faults.yaml")).unwrap();
    assert_eq!(config.faults.len(), 4);
    assert_eq!(config.faults[0].value, 500.0);
    assert!(config.faults[1].value.is_nan());
    assert!(!config.modbus.enabled);
    // Sensor section omitted entirely
    assert_eq!(config.sensor.max_valid, 200.0);
}

#[test]
fn minimal_document_takes_defaults() {
    let config = pc_project::from_yaml_str("version: 1\nname: minimal\n").unwrap();
    assert_eq!(config, PlantConfig::named("minimal"));
}

#[test]
fn invalid_document_is_rejected() {
    let err = pc_project::from_yaml_str("version: 1\nname: bad\ncontrol_loop:\n  period_s: -1\n")
        .unwrap_err();
    assert!(matches!(err, ProjectError::Validation(_)));

    let err = pc_project::from_yaml_str("name: no version\n").unwrap_err();
    assert!(matches!(err, ProjectError::Yaml(_)));
}

#[test]
fn unknown_extension_is_rejected() {
    let err = load(Path::new("plant.toml")).unwrap_err();
    assert!(matches!(err, ProjectError::UnsupportedFormat { .. }));
}
