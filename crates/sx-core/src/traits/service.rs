//! Managed service installation

use async_trait::async_trait;

use crate::error::ServiceError;

/// Makes the daemon restart-persistent under the host's service manager
#[async_trait]
pub trait ServiceInstaller: Send + Sync {
    /// Install, enable and start the service
    async fn install(&self) -> Result<(), ServiceError>;
}
