//! sx-manager: The manager side of sentinel
//!
//! The manager owns the master keypair, runs the registration listener that
//! records agents asking to be trusted, drives the accept handshake that pushes
//! its public key to an agent, and opens SSH sessions to trusted agents.

pub mod auth;
pub mod registration;
pub mod server;
pub mod session;
pub mod state;

pub use auth::KeyAuthority;
pub use registration::Registrar;
pub use server::RegistrationServer;
pub use session::ExecSession;
pub use state::ManagerState;
