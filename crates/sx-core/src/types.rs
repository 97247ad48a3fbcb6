//! Core domain types

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A record kept in one of the address-keyed stores
pub trait Record: Clone + Serialize + DeserializeOwned + Send + 'static {
    /// Network address that uniquely identifies this record
    fn address(&self) -> &str;
}

/// A trusted agent in the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    /// Operator-facing alias
    pub identity: String,
    /// Network address of the agent
    pub address: String,
}

impl HostEntry {
    pub fn new(identity: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            address: address.into(),
        }
    }
}

impl Record for HostEntry {
    fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for HostEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identity, self.address)
    }
}

/// An agent's registration awaiting operator approval
///
/// Stored with the same `{identity, address}` layout as [`HostEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Hostname the agent reported for itself
    #[serde(rename = "identity")]
    pub claimed_identity: String,
    /// Address observed by the listener, never supplied by the agent
    #[serde(rename = "address")]
    pub source_address: String,
}

impl PendingRequest {
    pub fn new(claimed_identity: impl Into<String>, source_address: impl Into<String>) -> Self {
        Self {
            claimed_identity: claimed_identity.into(),
            source_address: source_address.into(),
        }
    }

    /// Alias used when the operator does not pick one
    pub fn default_alias(&self) -> &str {
        if self.claimed_identity.is_empty() {
            &self.source_address
        } else {
            &self.claimed_identity
        }
    }
}

impl Record for PendingRequest {
    fn address(&self) -> &str {
        &self.source_address
    }
}

impl fmt::Display for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.claimed_identity, self.source_address)
    }
}
