//! Core error types for sentinel

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the on-disk record stores
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store file or its lock could not be read or written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store file exists but is not valid TOML
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The records could not be serialized
    #[error("Failed to serialize records: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the key authority
#[derive(Error, Debug)]
pub enum KeyError {
    /// The key directory or key files could not be created or written
    #[error("Key I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manager has never been initialized
    #[error("Key not found at {0}. Run 'sentinel install' first")]
    NotFound(PathBuf),

    /// Key generation failed
    #[error("Key generation failed: {0}")]
    Generate(String),

    /// Key material on disk could not be decoded
    #[error("Invalid key at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Errors raised by the registration protocol
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// `accept` was called for an address with no outstanding request
    #[error("No pending registration request from {0}")]
    NoSuchPendingRequest(String),

    /// The public key could not be loaded
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The key push to the agent failed or was rejected
    #[error("Handshake with {address} failed: {reason}")]
    HandshakeFailed { address: String, reason: String },

    /// A store could not be read or written
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by a remote execution session
#[derive(Error, Debug)]
pub enum ExecError {
    /// The private key could not be loaded
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The inventory could not be read to resolve the target
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transport to the agent could not be established
    #[error("Connection to {address} failed: {reason}")]
    Connection { address: String, reason: String },

    /// The agent rejected the manager's key
    #[error("Authentication as '{user}' rejected by {address}")]
    Authentication { address: String, user: String },

    /// The remote command failed or exited non-zero
    #[error("Remote command on {address} failed: {reason}")]
    RemoteExecution {
        address: String,
        reason: String,
        exit_status: Option<u32>,
    },

    /// The session was cancelled by the caller
    #[error("Remote execution cancelled")]
    Cancelled,

    /// The session exceeded its deadline
    #[error("Remote execution timed out after {0:?}")]
    TimedOut(Duration),

    /// Local terminal I/O failed
    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecError {
    /// Remote exit status, when the failure came from the remote command itself
    pub fn exit_status(&self) -> Option<u32> {
        match self {
            ExecError::RemoteExecution { exit_status, .. } => *exit_status,
            _ => None,
        }
    }
}

/// Errors raised while preparing the agent's execution account
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// A provisioning command could not be run or exited non-zero
    #[error("Command '{command}' failed: {reason}")]
    Command { command: String, reason: String },

    /// A file in the account's credential store could not be written
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while installing the managed service
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The running executable could not be located
    #[error("Cannot locate current executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    /// A file could not be written
    #[error("I/O error on {path}: {source}. Are you running as root?")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The service manager rejected a command
    #[error("'{command}' failed: {reason}")]
    Command { command: String, reason: String },
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
