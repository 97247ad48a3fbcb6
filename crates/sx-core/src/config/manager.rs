//! Manager configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::serde_utils::{duration_secs, option_duration_secs};
use crate::wire::{DEFAULT_FINALIZE_PORT, DEFAULT_REGISTRATION_PORT};

/// Configuration for the manager: registration listener, stores and sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Address the registration listener binds to
    pub listen_address: String,

    /// Directory holding the manager keypair
    pub key_dir: PathBuf,

    /// Inventory of trusted agents
    pub inventory_path: PathBuf,

    /// Pending registration requests
    pub pending_path: PathBuf,

    /// Port of the agent's finalize listener
    pub finalize_port: u16,

    /// Timeout for the key push to an agent
    #[serde(with = "duration_secs")]
    pub handshake_timeout: Duration,

    /// SSH port on agents
    pub ssh_port: u16,

    /// Account the manager logs in as on agents
    pub remote_user: String,

    /// Timeout for establishing an SSH session
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Upper bound on a single remote command; unbounded when absent
    #[serde(
        default,
        with = "option_duration_secs",
        skip_serializing_if = "Option::is_none"
    )]
    pub exec_timeout: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::rooted_at(&super::default_config_dir())
    }
}

impl ManagerConfig {
    /// Default configuration with every file kept under `dir`
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            listen_address: format!("0.0.0.0:{}", DEFAULT_REGISTRATION_PORT),
            key_dir: dir.to_path_buf(),
            inventory_path: dir.join("hosts.toml"),
            pending_path: dir.join("pending_hosts.toml"),
            finalize_port: DEFAULT_FINALIZE_PORT,
            handshake_timeout: Duration::from_secs(10),
            ssh_port: 22,
            remote_user: "sentinel".to_string(),
            connect_timeout: Duration::from_secs(10),
            exec_timeout: None,
        }
    }
}
