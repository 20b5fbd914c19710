pub mod catalog;
pub mod config;
pub mod error;
pub mod feed;
pub mod ipc;
pub mod lease;
pub mod scheduler;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use ipc::{DaemonClient, DaemonServer};
