//! # hubbub-server
//!
//! TCP pub/sub broker for hubbub.
//!
//! This crate provides:
//! - TCP connection handling with async I/O
//! - Per-connection wire format negotiation
//! - Single-task command dispatch over the broker state
//! - Retained topic values and snapshot-on-subscribe
//! - Layered YAML/environment configuration

pub mod config;
pub mod engine;
pub mod error;
pub mod server;

pub use config::{Config, ConfigError, NetworkConfig};
pub use engine::{BrokerEngine, ConnEvent};
pub use error::ServerError;
pub use server::{Server, ServerStats};
