//! Capabilities the handshake drives but does not implement

mod provision;
mod service;

pub use provision::AccountProvisioner;
pub use service::ServiceInstaller;
