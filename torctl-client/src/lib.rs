//! # torctl-client
//!
//! Client library for the Tor router control plane.
//!
//! This crate provides:
//! - A single persistent control connection with one dispatch task
//! - Correlation of concurrent requests to their responses by id
//! - Per-call deadlines with exactly-once resolution
//! - The control operations (pool, SOCKS listener, instances)

pub mod config;
pub mod connection;
pub mod controller;
pub mod error;
pub mod pending;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{ClientConfig, ConfigError};
pub use connection::Connection;
pub use controller::TorController;
pub use error::ClientError;
pub use pending::{ConnectionState, PendingTable};
pub use torctl_protocol::WireMode;
