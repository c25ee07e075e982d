//! Persistent engine configuration for the CLI.

use std::path::{Path, PathBuf};

use drowsy_core::config::EngineConfig;

const CONFIG_FILE_NAME: &str = "config.json";

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("drowsy").join(CONFIG_FILE_NAME))
}

pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, String> {
    explicit
        .or_else(default_config_path)
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

/// Read the stored config; a missing file yields defaults.
pub fn load_from_path(path: &Path) -> Result<EngineConfig, String> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
    EngineConfig::from_json(&raw)
        .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))
}

/// Stored config with `DROWSY_*` overrides applied and validated.
pub fn load_effective(path: &Path) -> Result<EngineConfig, String> {
    let mut config = load_from_path(path)?;
    config
        .apply_env_overrides()
        .map_err(|error| error.to_string())?;
    config.validate().map_err(|error| error.to_string())?;
    Ok(config)
}

pub fn save_to_path(config: &EngineConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|error| {
            format!(
                "Failed to create config directory {}: {}",
                parent.display(),
                error
            )
        })?;
    }

    let serialized = config
        .to_json_pretty()
        .map_err(|error| format!("Failed to serialize config: {error}"))?;
    std::fs::write(path, serialized)
        .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
}
