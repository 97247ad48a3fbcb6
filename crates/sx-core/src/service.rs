//! systemd integration for the registration daemon

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::ServiceError;
use crate::traits::ServiceInstaller;

/// Installs the running binary as a systemd unit that runs `sentinel daemon`
#[derive(Debug, Clone)]
pub struct SystemdService {
    /// Service name, also the unit file stem
    pub name: String,
    /// Where the binary is copied to
    pub binary_path: PathBuf,
    /// Directory holding unit files
    pub unit_dir: PathBuf,
    /// Working directory of the service
    pub working_dir: PathBuf,
    /// Config file passed to the daemon; it falls back to `$SENTINEL_HOME` when unset
    pub config_path: Option<PathBuf>,
}

impl SystemdService {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: "sentinel".to_string(),
            binary_path: PathBuf::from("/usr/local/bin/sentinel"),
            unit_dir: PathBuf::from("/etc/systemd/system"),
            working_dir: working_dir.into(),
            config_path: None,
        }
    }

    /// Run the daemon with `--config <path>`
    pub fn with_config(mut self, config_path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(config_path.into());
        self
    }

    /// Path of the unit file
    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(format!("{}.service", self.name))
    }

    /// Contents of the unit file
    pub fn unit_file(&self) -> String {
        let config_arg = match &self.config_path {
            Some(path) => format!(" --config {}", path.display()),
            None => String::new(),
        };
        format!(
            r#"[Unit]
Description=Sentinel registration daemon
After=network.target

[Service]
ExecStart={binary}{config_arg} daemon
Restart=always
User=root
WorkingDirectory={workdir}
Environment=SENTINEL_HOME={workdir}

[Install]
WantedBy=multi-user.target
"#,
            binary = self.binary_path.display(),
            config_arg = config_arg,
            workdir = self.working_dir.display(),
        )
    }

    async fn copy_binary(&self) -> Result<(), ServiceError> {
        let current = std::env::current_exe().map_err(ServiceError::CurrentExe)?;
        if current == self.binary_path {
            return Ok(());
        }

        let io_err = |source| ServiceError::Io {
            path: self.binary_path.clone(),
            source,
        };
        // Copy then rename so a running copy of the binary is never truncated
        let tmp = self.binary_path.with_extension("new");
        tokio::fs::copy(&current, &tmp).await.map_err(io_err)?;
        set_mode(&tmp, 0o755).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.binary_path)
            .await
            .map_err(io_err)?;

        tracing::info!("Installed binary at {:?}", self.binary_path);
        Ok(())
    }

    async fn systemctl(&self, args: &[&str]) -> Result<(), ServiceError> {
        let command = format!("systemctl {}", args.join(" "));
        tracing::debug!("Running {}", command);

        let output = Command::new("systemctl")
            .args(args)
            .output()
            .await
            .map_err(|e| ServiceError::Command {
                command: command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ServiceError::Command {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceInstaller for SystemdService {
    async fn install(&self) -> Result<(), ServiceError> {
        self.copy_binary().await?;

        let unit_path = self.unit_path();
        tokio::fs::write(&unit_path, self.unit_file())
            .await
            .map_err(|source| ServiceError::Io {
                path: unit_path.clone(),
                source,
            })?;
        tracing::info!("Wrote unit file {:?}", unit_path);

        self.systemctl(&["daemon-reload"]).await?;
        self.systemctl(&["enable", self.name.as_str()]).await?;
        self.systemctl(&["start", self.name.as_str()]).await?;

        tracing::info!("Service '{}' enabled and started", self.name);
        Ok(())
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
