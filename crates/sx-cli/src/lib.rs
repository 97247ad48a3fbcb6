//! sx-cli: Command-line interface for sentinel
//!
//! Provides the `sentinel` binary: manager and agent installation, the
//! registration daemon, approval of pending agents and remote execution.

pub mod commands;
pub mod output;
