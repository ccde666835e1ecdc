//! # hubbub-client
//!
//! Client library for hubbub.
//!
//! This crate provides:
//! - Async TCP client with wire format negotiation
//! - Publish, subscribe, unsubscribe, and listing operations
//! - Pull-based delivery of subscribed messages

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{Connection, ConnectionConfig};
pub use error::ClientError;
