//! Registration protocol: register, accept and the key push to the agent
//!
//! Per address the protocol moves `Unknown -> Pending -> Trusted`. Both store
//! transitions run with the pending registry locked; the key push to the agent
//! runs outside any lock. Lock order is always pending registry first,
//! inventory second.

use std::sync::Arc;

use sx_core::error::RegistrationError;
use sx_core::wire::{finalize_url, RegistrationStatus};
use sx_core::{HostEntry, PendingRequest};

use crate::state::ManagerState;

/// Drives registrations and accepts against shared manager state
#[derive(Clone)]
pub struct Registrar {
    state: Arc<ManagerState>,
    client: reqwest::Client,
}

impl Registrar {
    pub fn new(state: Arc<ManagerState>) -> Self {
        Self {
            state,
            // Agents are addressed directly, never through a proxy
            client: reqwest::Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn state(&self) -> &Arc<ManagerState> {
        &self.state
    }

    /// Record a registration from `source_address`.
    ///
    /// Repeat registrations while pending, and registrations from addresses
    /// that are already trusted, are absorbed without changing anything.
    pub async fn register(
        &self,
        claimed_identity: &str,
        source_address: &str,
    ) -> Result<RegistrationStatus, RegistrationError> {
        let mut pending = self.state.pending.lock().await?;

        if self.state.inventory.load().await?.contains_address(source_address) {
            tracing::debug!("{} is already trusted, ignoring registration", source_address);
            // Left behind when an accept could not clear its request
            if pending.remove(source_address).is_some() {
                pending.commit()?;
                tracing::info!("Cleared stale pending request for {}", source_address);
            }
            return Ok(RegistrationStatus::AlreadyTrusted);
        }

        let inserted = pending.insert(PendingRequest::new(claimed_identity, source_address));
        pending.commit()?;

        if inserted {
            tracing::info!(
                "New registration request: {} ({})",
                claimed_identity,
                source_address
            );
            tracing::info!("Action required: sentinel accept {}", source_address);
            Ok(RegistrationStatus::Pending)
        } else {
            tracing::debug!("{} is already pending", source_address);
            Ok(RegistrationStatus::AlreadyPending)
        }
    }

    /// The outstanding request for `address`, if any
    pub async fn pending_request(
        &self,
        address: &str,
    ) -> Result<Option<PendingRequest>, RegistrationError> {
        Ok(self.state.pending.get(address).await?)
    }

    /// Promote the pending request for `address` into the inventory.
    ///
    /// The manager's public key is pushed to the agent first, with no store
    /// lock held. Only once the agent confirms receipt is the entry appended
    /// to the inventory and the request removed. A failed push leaves both stores
    /// unchanged, so the operator can simply retry. A request that disappeared
    /// during the push (listener restart, concurrent accept) is reported as
    /// [`RegistrationError::NoSuchPendingRequest`].
    pub async fn accept(
        &self,
        address: &str,
        alias: Option<&str>,
    ) -> Result<HostEntry, RegistrationError> {
        let request = self
            .pending_request(address)
            .await?
            .ok_or_else(|| RegistrationError::NoSuchPendingRequest(address.to_string()))?;

        let public_key = self.state.keys.load_public_key()?;
        self.push_key(address, public_key).await?;

        let identity = match alias {
            Some(alias) if !alias.trim().is_empty() => alias.trim().to_string(),
            _ => request.default_alias().to_string(),
        };
        let entry = HostEntry::new(identity, address);

        let mut pending = self.state.pending.lock().await?;
        if !pending.contains(address) {
            tracing::warn!(
                "Pending request for {} vanished while its key was pushed",
                address
            );
            return Err(RegistrationError::NoSuchPendingRequest(address.to_string()));
        }

        self.state.inventory.append(entry.clone()).await?;
        pending.remove(address);
        if let Err(e) = pending.commit() {
            // The inventory already trusts the address; its next registration
            // clears the leftover request.
            tracing::error!(
                "{} is trusted but its pending request could not be removed: {}",
                entry,
                e
            );
        }

        tracing::info!("{} is now in the inventory", entry);
        Ok(entry)
    }

    /// POST the public key to the agent's finalize endpoint
    async fn push_key(&self, address: &str, public_key: Vec<u8>) -> Result<(), RegistrationError> {
        let config = &self.state.config;
        let url = finalize_url(address, config.finalize_port);
        tracing::debug!("Pushing public key to {}", url);

        let handshake_failed = |reason: String| RegistrationError::HandshakeFailed {
            address: address.to_string(),
            reason,
        };

        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(public_key)
            .timeout(config.handshake_timeout)
            .send()
            .await
            .map_err(|e| handshake_failed(format!("{}. Is the agent waiting for approval?", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = if body.trim().is_empty() {
                format!("agent responded {}", status)
            } else {
                format!("agent responded {}: {}", status, body.trim())
            };
            return Err(handshake_failed(reason));
        }

        Ok(())
    }
}
