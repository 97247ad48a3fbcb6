//! The local account the manager executes commands as
//!
//! Layout owned by this module:
//!
//! - `<home>/.ssh` (0700) and `<home>/.ssh/authorized_keys` (0600), both owned
//!   by the account
//! - an optional drop-in sudoers rule (0440) granting passwordless sudo

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use sx_core::config::AgentConfig;
use sx_core::error::ProvisionError;
use sx_core::traits::AccountProvisioner;

/// A system account created with `useradd`
#[derive(Debug, Clone)]
pub struct SystemAccount {
    pub name: String,
    pub home_dir: PathBuf,
    pub grant_sudo: bool,
    pub sudoers_path: PathBuf,
}

impl SystemAccount {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            name: config.account.clone(),
            home_dir: config.home_dir.clone(),
            grant_sudo: config.grant_sudo,
            sudoers_path: config.sudoers_path.clone(),
        }
    }

    async fn exists(&self) -> bool {
        Command::new("id")
            .arg("-u")
            .arg(&self.name)
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn chown(&self, path: &Path) -> Result<(), ProvisionError> {
        let owner = format!("{}:{}", self.name, self.name);
        run(Command::new("chown").arg("-R").arg(&owner).arg(path)).await
    }

    async fn install_sudo_rule(&self) -> Result<(), ProvisionError> {
        let rule = sudoers_rule(&self.name);
        write_file(&self.sudoers_path, rule.as_bytes(), 0o440).await?;
        tracing::info!("Granted passwordless sudo via {:?}", self.sudoers_path);
        Ok(())
    }
}

#[async_trait]
impl AccountProvisioner for SystemAccount {
    async fn provision(&self) -> Result<(), ProvisionError> {
        if self.exists().await {
            tracing::info!("Account '{}' already exists", self.name);
        } else {
            run(Command::new("useradd")
                .arg("-m")
                .arg("-d")
                .arg(&self.home_dir)
                .args(["-s", "/bin/bash"])
                .arg(&self.name))
            .await?;
            tracing::info!("Created account '{}'", self.name);
        }

        let ssh_dir = ensure_ssh_dir(&self.home_dir).await?;
        self.chown(&ssh_dir).await
    }

    async fn install_trusted_key(&self, key: &[u8]) -> Result<(), ProvisionError> {
        let path = write_authorized_keys(&self.home_dir, key).await?;
        self.chown(&self.home_dir.join(".ssh")).await?;
        tracing::info!("Installed manager key in {:?}", path);

        if self.grant_sudo {
            // The key is in place; sudo is a convenience
            if let Err(e) = self.install_sudo_rule().await {
                tracing::warn!("Could not grant sudo to '{}': {}", self.name, e);
            }
        }
        Ok(())
    }
}

/// Sudoers rule granting `account` passwordless sudo
pub fn sudoers_rule(account: &str) -> String {
    format!("{} ALL=(ALL) NOPASSWD:ALL\n", account)
}

/// Create `<home>/.ssh` with owner-only permissions
pub async fn ensure_ssh_dir(home: &Path) -> Result<PathBuf, ProvisionError> {
    let ssh_dir = home.join(".ssh");
    tokio::fs::create_dir_all(&ssh_dir)
        .await
        .map_err(|source| ProvisionError::Io {
            path: ssh_dir.clone(),
            source,
        })?;
    set_mode(&ssh_dir, 0o700).await?;
    Ok(ssh_dir)
}

/// Replace `<home>/.ssh/authorized_keys` with `key`
pub async fn write_authorized_keys(home: &Path, key: &[u8]) -> Result<PathBuf, ProvisionError> {
    let ssh_dir = ensure_ssh_dir(home).await?;
    let path = ssh_dir.join("authorized_keys");
    write_file(&path, key, 0o600).await?;
    Ok(path)
}

/// Write via a sibling temp file and rename it into place
async fn write_file(path: &Path, content: &[u8], mode: u32) -> Result<(), ProvisionError> {
    let io_err = |source| ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    tokio::fs::write(&tmp_path, content).await.map_err(io_err)?;
    set_mode(&tmp_path, mode).await?;
    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), ProvisionError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|source| ProvisionError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), ProvisionError> {
    Ok(())
}

async fn run(command: &mut Command) -> Result<(), ProvisionError> {
    let description = format!("{:?}", command.as_std());
    let output = command
        .output()
        .await
        .map_err(|e| ProvisionError::Command {
            command: description.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(ProvisionError::Command {
            command: description,
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
