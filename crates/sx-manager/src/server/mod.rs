//! HTTP registration listener

mod handler;
mod listener;

pub use handler::router;
pub use listener::RegistrationServer;
