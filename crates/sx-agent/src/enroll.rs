//! Agent enrolment: provision, listen, register, wait for the key

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use sx_core::config::AgentConfig;
use sx_core::traits::AccountProvisioner;
use sx_core::wire::RegistrationStatus;

use crate::finalize::{FinalizeListener, FinalizeOutcome};
use crate::registration::send_registration;

/// Result of an enrolment attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollOutcome {
    /// The manager's key is installed; this host is now trusted
    Trusted { fingerprint: String },
    /// The manager already trusts this address; nothing was waited for
    AlreadyTrusted,
    /// Stopped before the manager approved
    Aborted,
}

/// Enrol this host with the manager at `manager`.
///
/// The finalize listener is bound before the registration request is sent so
/// the manager can accept immediately. Waits for approval until `cancel` fires.
pub async fn enroll(
    manager: &str,
    config: &AgentConfig,
    provisioner: Arc<dyn AccountProvisioner>,
    cancel: CancellationToken,
) -> Result<EnrollOutcome> {
    provisioner
        .provision()
        .await
        .context("Failed to provision the execution account")?;

    let listener = FinalizeListener::bind(&config.finalize_address, provisioner).await?;

    let status = send_registration(manager, config).await?;
    match status {
        RegistrationStatus::Pending | RegistrationStatus::AlreadyPending => {
            tracing::info!("Registration {}, awaiting administrator approval", status);
        }
        RegistrationStatus::AlreadyTrusted => {
            tracing::info!("Manager already trusts this host");
            return Ok(EnrollOutcome::AlreadyTrusted);
        }
        RegistrationStatus::Failed => {
            anyhow::bail!("Manager could not record the registration, check its logs");
        }
    }

    Ok(match listener.wait(cancel).await? {
        FinalizeOutcome::Installed { fingerprint } => EnrollOutcome::Trusted { fingerprint },
        FinalizeOutcome::Aborted => EnrollOutcome::Aborted,
    })
}
