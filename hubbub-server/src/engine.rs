//! Broker engine: command dispatch over exclusively-owned state.
//!
//! The engine owns the topic store, the subscription registry, and the
//! connection table. It consumes [`ConnEvent`]s from a single dispatch task,
//! so command processing is strictly serialized and none of the state needs
//! a lock. Outbound delivery only queues bytes on per-connection channels;
//! the engine never waits on a socket.

use bytes::Bytes;
use hubbub_broker::{ConnId, SubscriptionRegistry, TopicStore};
use hubbub_protocol::codec::encode_message;
use hubbub_protocol::{Message, SubscriptionEntry, WireFormat};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

use crate::error::ServerError;

/// Connection lifecycle and command events fed to the engine.
#[derive(Debug)]
pub enum ConnEvent {
    /// A connection completed its handshake.
    Opened {
        conn: ConnId,
        addr: SocketAddr,
        format: WireFormat,
        outbound: mpsc::UnboundedSender<Bytes>,
    },
    /// A complete command frame was decoded on the connection.
    Command { conn: ConnId, message: Message },
    /// The connection ended, cleanly or not.
    Closed { conn: ConnId },
}

/// Per-connection state recorded at handshake.
struct ConnectionHandle {
    format: WireFormat,
    outbound: mpsc::UnboundedSender<Bytes>,
    addr: SocketAddr,
}

/// The broker state machine.
pub struct BrokerEngine {
    topics: TopicStore,
    registry: SubscriptionRegistry,
    connections: HashMap<ConnId, ConnectionHandle>,
}

impl BrokerEngine {
    pub fn new() -> Self {
        Self {
            topics: TopicStore::new(),
            registry: SubscriptionRegistry::new(),
            connections: HashMap::new(),
        }
    }

    /// Applies one event to the broker state.
    pub fn handle_event(&mut self, event: ConnEvent) {
        match event {
            ConnEvent::Opened {
                conn,
                addr,
                format,
                outbound,
            } => {
                tracing::info!("Connection {} registered: {} ({})", conn, addr, format);
                self.connections.insert(
                    conn,
                    ConnectionHandle {
                        format,
                        outbound,
                        addr,
                    },
                );
            }
            ConnEvent::Command { conn, message } => self.handle_command(conn, message),
            ConnEvent::Closed { conn } => {
                if let Some(handle) = self.connections.remove(&conn) {
                    self.registry.remove_connection(conn);
                    tracing::info!("Connection {} evicted: {}", conn, handle.addr);
                }
            }
        }
    }

    fn handle_command(&mut self, conn: ConnId, message: Message) {
        if !self.connections.contains_key(&conn) {
            tracing::debug!("Command from unregistered connection {}", conn);
            return;
        }
        match message {
            Message::Publish { topic, value } => self.handle_publish(&topic, value),
            Message::Subscribe { topic } => self.handle_subscribe(conn, &topic),
            Message::Unsubscribe { topic } => self.handle_unsubscribe(conn, &topic),
            Message::ListAll => self.handle_list_all(conn),
            Message::Subscriptions { .. } => {
                // Listing replies flow broker to client only.
                tracing::debug!("Connection {} sent a subscriptions reply, ignoring", conn);
            }
        }
    }

    fn handle_publish(&mut self, topic: &str, value: Value) {
        if topic.is_empty() {
            tracing::debug!("Ignoring publish with empty topic");
            return;
        }
        self.topics.put(topic, value.clone());

        let targets = self.registry.resolve(topic);
        tracing::debug!("Publishing '{}' to {} subscriber(s)", topic, targets.len());

        let message = Message::publish(topic, value);
        for (subscriber, _) in targets {
            // Best-effort fan-out: one failed send never blocks the rest.
            if let Err(e) = self.deliver(subscriber, &message) {
                tracing::debug!("Fan-out to connection {} failed: {}", subscriber, e);
            }
        }
    }

    fn handle_subscribe(&mut self, conn: ConnId, pattern: &str) {
        if pattern.is_empty() {
            tracing::debug!("Connection {} sent subscribe with empty topic", conn);
            return;
        }
        let format = match self.connections.get(&conn) {
            Some(handle) => handle.format,
            None => return,
        };
        self.registry.subscribe(pattern, conn, format);

        // Late subscribers receive the retained value right away, addressed
        // by the pattern they subscribed with.
        if let Some(value) = self.topics.current_for(pattern) {
            let snapshot = Message::publish(pattern, value.clone());
            if let Err(e) = self.deliver(conn, &snapshot) {
                tracing::debug!("Snapshot to connection {} failed: {}", conn, e);
            }
        }
    }

    fn handle_unsubscribe(&mut self, conn: ConnId, pattern: &str) {
        if pattern.is_empty() {
            tracing::debug!("Connection {} sent unsubscribe with empty topic", conn);
            return;
        }
        self.registry.unsubscribe(pattern, conn);
    }

    fn handle_list_all(&mut self, conn: ConnId) {
        let entries = self
            .registry
            .entries()
            .into_iter()
            .map(|(topic, subscriber)| SubscriptionEntry {
                topic,
                conn: subscriber.0,
            })
            .collect();
        let reply = Message::Subscriptions { entries };
        if let Err(e) = self.deliver(conn, &reply) {
            tracing::debug!("Listing reply to connection {} failed: {}", conn, e);
        }
    }

    /// Encodes `message` in the connection's negotiated format and queues
    /// the frame on its outbound channel.
    fn deliver(&self, conn: ConnId, message: &Message) -> Result<(), ServerError> {
        let handle = self
            .connections
            .get(&conn)
            .ok_or(ServerError::ConnectionClosed(conn.0))?;
        let frame = encode_message(message, handle.format)?;
        handle
            .outbound
            .send(frame.freeze())
            .map_err(|_| ServerError::ConnectionClosed(conn.0))?;
        Ok(())
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Read access to the topic store.
    pub fn topics(&self) -> &TopicStore {
        &self.topics
    }

    /// Read access to the subscription registry.
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }
}

impl Default for BrokerEngine {
    fn default() -> Self {
        Self::new()
    }
}
