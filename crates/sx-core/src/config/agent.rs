//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::wire::{DEFAULT_FINALIZE_PORT, DEFAULT_REGISTRATION_PORT};

/// Configuration for an agent enrolling with a manager
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Port of the manager's registration listener
    pub manager_port: u16,

    /// Address the one-shot finalize listener binds to
    pub finalize_address: String,

    /// Local account the manager logs in as
    pub account: String,

    /// Home directory of that account
    pub home_dir: PathBuf,

    /// Grant the account passwordless sudo
    pub grant_sudo: bool,

    /// Drop-in sudoers file for the account
    pub sudoers_path: PathBuf,

    /// Timeout for the registration request
    #[serde(with = "duration_secs")]
    pub register_timeout: Duration,

    /// Identity to claim, defaults to the hostname
    pub hostname: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            manager_port: DEFAULT_REGISTRATION_PORT,
            finalize_address: format!("0.0.0.0:{}", DEFAULT_FINALIZE_PORT),
            account: "sentinel".to_string(),
            home_dir: PathBuf::from("/home/sentinel"),
            grant_sudo: true,
            sudoers_path: PathBuf::from("/etc/sudoers.d/sentinel"),
            register_timeout: Duration::from_secs(10),
            hostname: None,
        }
    }
}

impl AgentConfig {
    /// Identity claimed on registration, falling back to the hostname
    pub fn claimed_identity(&self) -> String {
        self.hostname
            .clone()
            .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned())
    }
}
