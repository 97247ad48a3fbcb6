//! sx-core: Shared building blocks for sentinel
//!
//! This crate provides the data model, the locked on-disk stores backing the
//! inventory and pending registry, wire constants for the registration
//! handshake, and configuration shared by the manager, agent and CLI.

pub mod config;
pub mod error;
pub mod inventory;
pub mod pending;
pub mod service;
pub mod setup;
pub mod store;
pub mod traits;
pub mod types;
pub mod wire;

pub use error::{
    ConfigError, ExecError, KeyError, ProvisionError, RegistrationError, ServiceError, StoreError,
};
pub use inventory::{Inventory, InventoryStore};
pub use pending::PendingRegistry;
pub use types::{HostEntry, PendingRequest, Record};
