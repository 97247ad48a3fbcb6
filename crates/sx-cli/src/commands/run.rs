//! Run command implementation

use std::sync::Arc;

use anyhow::Result;

use sx_core::config::ManagerConfig;
use sx_core::ExecError;
use sx_manager::session::SessionIo;
use sx_manager::{ExecSession, ManagerState};

use crate::commands::shutdown_token;
use crate::output::{print_error, print_info};

/// Run `command` on `target` with the terminal attached.
///
/// Returns the process exit code: the remote status when one was reported,
/// 1 for any other failure.
pub async fn run_command(config: ManagerConfig, target: &str, command: &[String]) -> Result<i32> {
    if command.is_empty() {
        anyhow::bail!("No command given");
    }
    let command = command.join(" ");

    let session = ExecSession::new(Arc::new(ManagerState::new(config)));
    let address = session.resolve(target).await?;
    if address != target {
        print_info(&format!("Using alias {} ({})", target, address));
    }

    match session
        .run(target, &command, SessionIo::terminal(), shutdown_token())
        .await
    {
        Ok(()) => Ok(0),
        Err(e) => {
            print_error(&e.to_string());
            Ok(exit_code(&e))
        }
    }
}

fn exit_code(err: &ExecError) -> i32 {
    err.exit_status()
        .and_then(|status| i32::try_from(status).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}
