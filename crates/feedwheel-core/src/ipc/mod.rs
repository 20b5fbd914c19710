//! IPC module for daemon-client communication
//!
//! Unix socket based IPC so one-shot CLI invocations can submit jobs to the
//! long-running scheduler daemon.

mod client;
mod protocol;
mod server;

pub use client::{is_daemon_running, DaemonClient};
pub use protocol::*;
pub use server::DaemonServer;
