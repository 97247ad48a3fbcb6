//! Durable inventory of trusted agents

use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::store::RecordStore;
use crate::types::HostEntry;

/// Snapshot of the inventory in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    hosts: Vec<HostEntry>,
}

impl Inventory {
    pub fn new(hosts: Vec<HostEntry>) -> Self {
        Self { hosts }
    }

    /// Entries in insertion order
    pub fn hosts(&self) -> &[HostEntry] {
        &self.hosts
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Resolve an alias to its address.
    ///
    /// Matching is exact and case-sensitive. Unknown input is returned as-is so
    /// callers can pass a raw address.
    pub fn resolve_alias<'a>(&'a self, target: &'a str) -> &'a str {
        self.lookup(target).map(|h| h.address.as_str()).unwrap_or(target)
    }

    /// The entry whose identity is exactly `identity`
    pub fn lookup(&self, identity: &str) -> Option<&HostEntry> {
        self.hosts.iter().find(|h| h.identity == identity)
    }

    /// Whether `address` is already trusted
    pub fn contains_address(&self, address: &str) -> bool {
        self.hosts.iter().any(|h| h.address == address)
    }
}

/// Persistent inventory store
pub struct InventoryStore {
    store: RecordStore<HostEntry>,
}

impl InventoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: RecordStore::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Load the inventory. A missing file is an empty inventory.
    pub async fn load(&self) -> Result<Inventory, StoreError> {
        Ok(Inventory::new(self.store.load().await?))
    }

    /// Entries for display, in insertion order
    pub async fn list(&self) -> Result<Vec<HostEntry>, StoreError> {
        self.store.load().await
    }

    /// Append an entry.
    ///
    /// A duplicate address is ignored and reported as `Ok(false)`; the existing
    /// row is kept unchanged.
    pub async fn append(&self, entry: HostEntry) -> Result<bool, StoreError> {
        let address = entry.address.clone();
        let inserted = self.store.update(|g| g.insert(entry)).await?;
        if !inserted {
            tracing::warn!("{} is already in the inventory, keeping existing entry", address);
        }
        Ok(inserted)
    }

    /// Resolve `target` against the current inventory
    pub async fn resolve_alias(&self, target: &str) -> Result<String, StoreError> {
        let inventory = self.load().await?;
        Ok(inventory.resolve_alias(target).to_string())
    }
}
