//! First-run preparation of the manager's configuration root
//!
//! Creates the directory, a commented default config file and an empty
//! inventory. Key generation is left to the key authority.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::ManagerConfig;

/// Paths touched by [`prepare_manager_root`]
#[derive(Debug)]
pub struct SetupResult {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
    pub inventory_path: PathBuf,
    /// Whether a new config file was written
    pub created_config: bool,
}

/// Prepare the directory holding `config_path` for a manager, writing the
/// default config to `config_path` itself. Existing files are left alone.
pub fn prepare_manager_root(config_path: &Path) -> Result<SetupResult> {
    let config_dir = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create config directory: {:?}", config_dir))?;
    set_mode(config_dir, 0o700)
        .with_context(|| format!("Failed to restrict permissions on {:?}", config_dir))?;

    let created_config = !config_path.exists();
    if created_config {
        fs::write(config_path, generate_default_config(config_dir))
            .with_context(|| "Failed to write config file")?;
        tracing::info!("Created default configuration at {:?}", config_path);
    }

    let inventory_path = ManagerConfig::rooted_at(config_dir).inventory_path;
    if !inventory_path.exists() {
        fs::write(&inventory_path, "hosts = []\n")
            .with_context(|| format!("Failed to create {:?}", inventory_path))?;
        set_mode(&inventory_path, 0o600)?;
        tracing::info!("Created empty inventory at {:?}", inventory_path);
    }

    Ok(SetupResult {
        config_dir: config_dir.to_path_buf(),
        config_path: config_path.to_path_buf(),
        inventory_path,
        created_config,
    })
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Generate default configuration content
fn generate_default_config(config_dir: &Path) -> String {
    format!(
        r#"# Sentinel configuration
# Auto-generated by 'sentinel install'

[manager]
# Registration listener (agents call /register here)
listen_address = "0.0.0.0:9090"

# Keypair and stores
key_dir = "{dir}"
inventory_path = "{dir}/hosts.toml"
pending_path = "{dir}/pending_hosts.toml"

# Agent finalize port and key push timeout in seconds
finalize_port = 9091
handshake_timeout = 10

# Remote execution
ssh_port = 22
remote_user = "sentinel"
connect_timeout = 10
# exec_timeout = 300

[agent]
manager_port = 9090
finalize_address = "0.0.0.0:9091"
account = "sentinel"
home_dir = "/home/sentinel"
grant_sudo = true
sudoers_path = "/etc/sudoers.d/sentinel"
register_timeout = 10
# hostname = "db-2"
"#,
        dir = config_dir.display()
    )
}
