//! # hubbub-broker
//!
//! In-memory broker state for hubbub.
//!
//! This crate provides:
//! - The topic store with retained value histories and prefix matching
//! - The subscription registry with substring delivery resolution
//! - Connection identity

pub mod registry;
pub mod topic;

pub use registry::{ConnId, SubscriptionRegistry};
pub use topic::TopicStore;
