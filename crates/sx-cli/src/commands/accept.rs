//! Accept command implementation

use std::sync::Arc;

use anyhow::Result;

use sx_core::config::ManagerConfig;
use sx_core::RegistrationError;
use sx_manager::{ManagerState, Registrar};

use crate::commands::prompt;
use crate::output::{print_info, print_success};

/// Approve the pending registration from `address`.
///
/// Without `--alias` the operator is asked for one; an empty answer keeps the
/// hostname the agent reported.
pub async fn accept_command(
    config: ManagerConfig,
    address: &str,
    alias: Option<String>,
) -> Result<()> {
    let registrar = Registrar::new(Arc::new(ManagerState::new(config)));

    let request = registrar
        .pending_request(address)
        .await?
        .ok_or_else(|| RegistrationError::NoSuchPendingRequest(address.to_string()))?;

    let alias = match alias {
        Some(alias) => alias,
        None => prompt(&format!(
            "Alias for {} [{}]:",
            request,
            request.default_alias()
        ))?,
    };

    print_info(&format!("Sending public key to {}...", address));
    let entry = registrar.accept(address, Some(&alias)).await?;

    print_success(&format!("{} added to the inventory", entry));
    println!("Run commands with: sentinel run {} <command>", entry.identity);
    Ok(())
}
