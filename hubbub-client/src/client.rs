//! High-level client API.

use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use hubbub_protocol::{Message, SubscriptionEntry};
use serde_json::Value;
use std::sync::Arc;

/// High-level client for a hubbub broker.
pub struct Client {
    conn: Arc<Connection>,
}

impl Client {
    /// Creates a new client with the given configuration.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            conn: Arc::new(Connection::new(config)),
        }
    }

    /// Connects to the broker.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.conn.connect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.conn.close().await
    }

    /// Returns the underlying connection.
    pub fn connection(&self) -> Arc<Connection> {
        self.conn.clone()
    }

    /// Publishes a value to a topic.
    pub async fn publish(&self, topic: &str, value: Value) -> Result<(), ClientError> {
        self.conn.send(&Message::publish(topic, value)).await
    }

    /// Subscribes to a topic pattern.
    ///
    /// If the broker holds a current value for the pattern, it arrives as
    /// the first [`pull`](Self::pull) after subscribing.
    pub async fn subscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.conn.send(&Message::subscribe(topic)).await
    }

    /// Cancels a subscription to a topic pattern.
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ClientError> {
        self.conn.send(&Message::unsubscribe(topic)).await
    }

    /// Waits for the next published message.
    pub async fn pull(&self) -> Result<(String, Value), ClientError> {
        self.conn.pull().await
    }

    /// Lists every subscription the broker currently holds.
    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionEntry>, ClientError> {
        self.conn.list_subscriptions().await
    }
}
