//! Shared manager state

use sx_core::config::ManagerConfig;
use sx_core::{InventoryStore, PendingRegistry};

use crate::auth::KeyAuthority;

/// State shared by the registration listener, the accept handshake and
/// remote execution sessions
///
/// Each store owns its own locking, so one `ManagerState` behind an `Arc` is
/// all a process needs.
pub struct ManagerState {
    /// Configuration
    pub config: ManagerConfig,
    /// Master keypair
    pub keys: KeyAuthority,
    /// Trusted agents
    pub inventory: InventoryStore,
    /// Requests awaiting approval
    pub pending: PendingRegistry,
}

impl ManagerState {
    /// Create state backed by the paths in `config`
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            keys: KeyAuthority::new(&config.key_dir),
            inventory: InventoryStore::new(&config.inventory_path),
            pending: PendingRegistry::new(&config.pending_path),
            config,
        }
    }
}
