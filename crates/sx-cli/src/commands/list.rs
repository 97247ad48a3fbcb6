//! List and pending command implementations

use anyhow::{Context, Result};

use sx_core::config::ManagerConfig;
use sx_core::{InventoryStore, PendingRegistry};

use crate::output::{format_hosts, format_pending};

/// Print the inventory of trusted agents
pub async fn list_command(config: &ManagerConfig) -> Result<()> {
    let hosts = InventoryStore::new(&config.inventory_path)
        .list()
        .await
        .context("Failed to read the inventory")?;

    println!("{}", format_hosts(&hosts));
    Ok(())
}

/// Print registrations waiting for `sentinel accept`
pub async fn pending_command(config: &ManagerConfig) -> Result<()> {
    let requests = PendingRegistry::new(&config.pending_path)
        .list()
        .await
        .context("Failed to read pending registrations")?;

    println!("{}", format_pending(&requests));
    if !requests.is_empty() {
        println!("\nApprove with: sentinel accept <address>");
    }
    Ok(())
}
