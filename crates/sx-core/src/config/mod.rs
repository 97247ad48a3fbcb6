//! Configuration management for sentinel

mod agent;
mod manager;
pub mod serde_utils;

pub use agent::AgentConfig;
pub use manager::ManagerConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable overriding the configuration root
pub const HOME_ENV: &str = "SENTINEL_HOME";

/// System-wide configuration root used when running as root
pub const SYSTEM_CONFIG_DIR: &str = "/etc/sentinel";

/// Top-level `config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub manager: ManagerConfig,
    pub agent: AgentConfig,
}

/// Get the default configuration directory
///
/// `$SENTINEL_HOME` wins; otherwise root uses `/etc/sentinel` and everyone
/// else the per-user config directory.
pub fn default_config_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    if is_root() {
        return PathBuf::from(SYSTEM_CONFIG_DIR);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sentinel")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

#[cfg(unix)]
fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Load `path`, falling back to defaults when the file does not exist
pub fn load_or_default(path: &Path) -> Result<ConfigFile, ConfigError> {
    match load_config(path) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => {
            tracing::debug!("No config at {:?}, using defaults", path);
            Ok(ConfigFile::default())
        }
        Err(e) => Err(e),
    }
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}
