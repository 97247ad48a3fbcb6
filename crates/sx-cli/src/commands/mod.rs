//! CLI command implementations

mod accept;
mod daemon;
mod install;
mod list;
mod run;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use sx_core::config::{self, ConfigFile};

pub use accept::accept_command;
pub use daemon::daemon_command;
pub use install::{install_command, Role};
pub use list::{list_command, pending_command};
pub use run::run_command;

/// Load the configuration named by `--config`, or the default one.
///
/// An explicitly named file must exist; a missing default file means
/// defaults rooted at the default config directory.
pub fn load_config(config_path: Option<&Path>) -> Result<(PathBuf, ConfigFile)> {
    match config_path {
        Some(path) => {
            let config = config::load_config(path)
                .with_context(|| format!("Failed to load config from {:?}", path))?;
            Ok((path.to_path_buf(), config))
        }
        None => {
            let path = config::default_config_path();
            let config = config::load_or_default(&path)
                .with_context(|| format!("Failed to load config from {:?}", path))?;
            Ok((path, config))
        }
    }
}

/// Ask a question on the terminal and return the trimmed answer.
///
/// A closed stdin yields an empty answer.
pub(crate) fn prompt(question: &str) -> Result<String> {
    print!("{} ", question);
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Ask a yes/no question; anything but "y"/"yes" is no
pub(crate) fn confirm(question: &str) -> Result<bool> {
    let answer = prompt(&format!("{} [y/N]", question))?;
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

/// Token cancelled on Ctrl+C or SIGTERM
pub(crate) fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }

        trigger.cancel();
    });

    cancel
}
