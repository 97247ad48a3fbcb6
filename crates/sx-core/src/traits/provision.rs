//! Agent account provisioning

use async_trait::async_trait;

use crate::error::ProvisionError;

/// Creates the isolated account the manager executes commands as, and owns
/// the layout of its trusted-credential store
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    /// Create the account and its credential directory. Must be idempotent.
    async fn provision(&self) -> Result<(), ProvisionError>;

    /// Install `key` (OpenSSH public key text) as the account's trusted key
    async fn install_trusted_key(&self, key: &[u8]) -> Result<(), ProvisionError>;
}
