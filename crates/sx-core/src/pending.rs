//! Pending registration requests awaiting operator approval

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::store::{RecordStore, StoreGuard};
use crate::types::PendingRequest;

/// Persistent registry of pending requests, keyed by source address
pub struct PendingRegistry {
    store: RecordStore<PendingRequest>,
}

impl PendingRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: RecordStore::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Drop every outstanding request.
    ///
    /// Called when the registration listener starts, so requests never outlive
    /// the daemon that received them.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.update(|g| g.clear()).await
    }

    /// Record a request. Returns `false` if the address is already pending.
    pub async fn add(&self, request: PendingRequest) -> Result<bool, StoreError> {
        self.store.update(|g| g.insert(request)).await
    }

    /// Remove and return the request for `address`
    pub async fn take(&self, address: &str) -> Result<Option<PendingRequest>, StoreError> {
        self.store.update(|g| g.remove(address)).await
    }

    /// The request for `address`, if any
    pub async fn get(&self, address: &str) -> Result<Option<PendingRequest>, StoreError> {
        Ok(self
            .store
            .load()
            .await?
            .into_iter()
            .find(|r| r.source_address == address))
    }

    /// All requests in arrival order
    pub async fn list(&self) -> Result<Vec<PendingRequest>, StoreError> {
        self.store.load().await
    }

    /// Lock the registry for a multi-step operation such as an accept
    pub async fn lock(&self) -> Result<StoreGuard<PendingRequest>, StoreError> {
        self.store.lock().await
    }
}
