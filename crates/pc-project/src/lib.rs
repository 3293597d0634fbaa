//! pc-project: configuration file format and validation.

pub mod schema;
pub mod validate;

pub use schema::*;
pub use validate::{ValidationError, validate_config};

use std::path::Path;

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unsupported config format: {path} (expected .yaml, .yml or .json)")]
    UnsupportedFormat { path: String },

    #[error("JSON cannot carry non-finite fault value {value} at tick {tick}; use YAML")]
    NonFiniteJson { tick: u64, value: f64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Load a config, picking the format from the file extension.
pub fn load(path: &Path) -> ProjectResult<PlantConfig> {
    match extension(path).as_deref() {
        Some("yaml" | "yml") => load_yaml(path),
        Some("json") => load_json(path),
        _ => Err(ProjectError::UnsupportedFormat {
            path: path.display().to_string(),
        }),
    }
}

pub fn load_yaml(path: &Path) -> ProjectResult<PlantConfig> {
    let content = std::fs::read_to_string(path)?;
    from_yaml_str(&content)
}

pub fn from_yaml_str(content: &str) -> ProjectResult<PlantConfig> {
    let config: PlantConfig = serde_yaml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

pub fn save_yaml(path: &Path, config: &PlantConfig) -> ProjectResult<()> {
    validate_config(config)?;
    let content = serde_yaml::to_string(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_json(path: &Path) -> ProjectResult<PlantConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: PlantConfig = serde_json::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

/// Save as JSON. JSON has no NaN or infinity, so faults with such values
/// (valid in YAML as `.nan` / `.inf`) are refused rather than written as
/// `null`.
pub fn save_json(path: &Path, config: &PlantConfig) -> ProjectResult<()> {
    validate_config(config)?;
    if let Some(fault) = config.faults.iter().find(|f| !f.value.is_finite()) {
        return Err(ProjectError::NonFiniteJson {
            tick: fault.tick,
            value: fault.value,
        });
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}
