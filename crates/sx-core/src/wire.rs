//! HTTP handshake wire format shared by manager and agent

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Port the manager's registration listener binds by default
pub const DEFAULT_REGISTRATION_PORT: u16 = 9090;

/// Port the agent's finalize listener binds by default
pub const DEFAULT_FINALIZE_PORT: u16 = 9091;

/// Registration endpoint on the manager
pub const REGISTER_PATH: &str = "/register";

/// Key delivery endpoint on the agent
pub const FINALIZE_PATH: &str = "/finalize";

/// Query string of a registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterQuery {
    /// Hostname the agent claims for itself
    #[serde(default)]
    pub host: String,
}

/// Outcome of a registration, as seen by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// A new pending request was recorded
    Pending,
    /// A request from this address is already waiting
    AlreadyPending,
    /// This address is already in the inventory
    AlreadyTrusted,
    /// The manager could not record the request
    Failed,
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RegistrationStatus::Pending => "pending",
            RegistrationStatus::AlreadyPending => "already pending",
            RegistrationStatus::AlreadyTrusted => "already trusted",
            RegistrationStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Body of every registration response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub status: RegistrationStatus,
}

impl RegisterResponse {
    pub fn new(status: RegistrationStatus) -> Self {
        Self { status }
    }
}

/// Host part of an address, bracketed when it is an IPv6 literal
pub fn url_host(address: &str) -> String {
    match address.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{}]", ip),
        _ => address.to_string(),
    }
}

/// Address in `host:port` form, suitable for `TcpStream::connect`
///
/// Inputs that already carry a port are returned unchanged.
pub fn socket_addr(address: &str, port: u16) -> String {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return addr.to_string();
    }
    match address.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port).to_string(),
        Err(_) => format!("{}:{}", address, port),
    }
}

/// Registration URL on a manager
pub fn register_url(manager: &str, port: u16) -> String {
    format!("http://{}:{}{}", url_host(manager), port, REGISTER_PATH)
}

/// Finalize URL on an agent
pub fn finalize_url(agent: &str, port: u16) -> String {
    format!("http://{}:{}{}", url_host(agent), port, FINALIZE_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_snake_case() {
        let body = serde_json::to_string(&RegisterResponse::new(RegistrationStatus::AlreadyPending))
            .unwrap();
        assert_eq!(body, r#"{"status":"already_pending"}"#);
    }

    #[test]
    fn test_socket_addr() {
        assert_eq!(socket_addr("10.0.0.7", 22), "10.0.0.7:22");
        assert_eq!(socket_addr("127.0.0.1:2200", 22), "127.0.0.1:2200");
        assert_eq!(socket_addr("::1", 22), "[::1]:22");
        assert_eq!(socket_addr("db.internal", 22), "db.internal:22");
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            finalize_url("10.0.0.7", DEFAULT_FINALIZE_PORT),
            "http://10.0.0.7:9091/finalize"
        );
        assert_eq!(
            register_url("fd00::1", DEFAULT_REGISTRATION_PORT),
            "http://[fd00::1]:9090/register"
        );
    }
}
