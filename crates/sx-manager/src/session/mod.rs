//! Remote execution over SSH

mod exec;
mod handler;

pub use exec::{ExecSession, SessionIo};
