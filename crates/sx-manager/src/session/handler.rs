//! SSH client callbacks

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;

/// Client handler for manager-initiated sessions
///
/// Agents' host keys are not pinned: trust runs from manager to agent only, so
/// the key is accepted and its fingerprint logged.
pub(crate) struct SessionHandler {
    address: String,
}

impl SessionHandler {
    pub(crate) fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl client::Handler for SessionHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!(
            "Host key for {}: {}",
            self.address,
            server_public_key.fingerprint()
        );
        Ok(true)
    }
}
