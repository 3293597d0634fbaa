use pc_project::schema::*;
use pc_project::{ProjectError, load_json, load_yaml, save_json, save_yaml, validate_config};

fn sample() -> PlantConfig {
    let mut config = PlantConfig::named("Roundtrip");
    config.controller.integral_limits = Some(RangeDef {
        min: -50.0,
        max: 50.0,
    });
    config.plant.disturbance = Some(DisturbanceDef {
        amplitude: 0.2,
        seed: 99,
    });
    config.faults = vec![FaultDef {
        tick: 12,
        value: 350.0,
    }];
    config
}

#[test]
fn roundtrip_yaml() {
    let config = sample();
    validate_config(&config).unwrap();

    let path = std::env::temp_dir().join("pc_project_roundtrip.yaml");
    save_yaml(&path, &config).unwrap();
    let loaded = load_yaml(&path).unwrap();

    assert_eq!(config, loaded);
}

#[test]
fn roundtrip_json() {
    let config = sample();
    let path = std::env::temp_dir().join("pc_project_roundtrip.json");
    save_json(&path, &config).unwrap();
    let loaded = load_json(&path).unwrap();

    assert_eq!(config, loaded);
}

#[test]
fn save_refuses_invalid_config() {
    let mut config = sample();
    config.control_loop.fault_threshold = 0;
    let path = std::env::temp_dir().join("pc_project_invalid.yaml");
    assert!(save_yaml(&path, &config).is_err());
}

#[test]
fn nan_faults_roundtrip_through_yaml_only() {
    let mut config = sample();
    config.faults.push(FaultDef {
        tick: 40,
        value: f64::NAN,
    });

    let yaml = std::env::temp_dir().join("pc_project_nan_fault.yaml");
    save_yaml(&yaml, &config).unwrap();
    let loaded = load_yaml(&yaml).unwrap();
    assert_eq!(loaded.faults.len(), 2);
    assert!(loaded.faults[1].value.is_nan());

    let json = std::env::temp_dir().join("pc_project_nan_fault.json");
    let err = save_json(&json, &config).unwrap_err();
    assert!(matches!(err, ProjectError::NonFiniteJson { tick: 40, value } if value.is_nan()));
}
