//! Configuration file management.
//!
//! Handles loading the optional TOML configuration file.

use std::fs;
use std::path::Path;

use crate::domain::{AppConfig, AppError, Result};

/// Load configuration from an explicit file, the default location, or defaults.
///
/// # Errors
/// Returns error if an explicit file is missing, or any file found cannot be
/// read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(AppError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return load_config_from_file(path);
    }

    let config_path = AppConfig::default_config_path();
    if config_path.exists() {
        load_config_from_file(&config_path)
    } else {
        tracing::debug!(path = %config_path.display(), "No config file, using defaults");
        Ok(AppConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    let config = toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })?;

    tracing::info!(path = %path.display(), "Configuration loaded");

    Ok(config)
}
