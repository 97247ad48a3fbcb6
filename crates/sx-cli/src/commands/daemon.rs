//! Daemon command implementation

use std::sync::Arc;

use anyhow::Result;

use sx_core::config::ManagerConfig;
use sx_manager::{ManagerState, Registrar, RegistrationServer};

use crate::commands::shutdown_token;
use crate::output::print_warning;

/// Run the registration listener until Ctrl+C or SIGTERM
pub async fn daemon_command(config: ManagerConfig, bind_override: Option<String>) -> Result<()> {
    let bind_addr = bind_override.unwrap_or_else(|| config.listen_address.clone());
    let state = Arc::new(ManagerState::new(config));

    match state.keys.fingerprint() {
        Ok(fingerprint) => tracing::info!("Manager key fingerprint: {}", fingerprint),
        Err(e) => print_warning(&format!("{}. Agents cannot be accepted until then", e)),
    }

    let server = RegistrationServer::bind(Registrar::new(Arc::clone(&state)), &bind_addr).await?;
    tracing::info!("Sentinel daemon listening on {}", server.local_addr()?);

    server.run(shutdown_token()).await?;

    tracing::info!("Sentinel daemon stopped");
    Ok(())
}
