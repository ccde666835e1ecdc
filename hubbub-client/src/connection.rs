//! Connection management.

use crate::error::ClientError;
use hubbub_protocol::codec::{decode_payload, encode_message};
use hubbub_protocol::{encode_frame, FrameDecoder, Message, SubscriptionEntry, WireFormat};
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Broker address.
    pub addr: SocketAddr,
    /// Wire format announced in the handshake.
    pub format: WireFormat,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for request/reply exchanges (listing).
    pub request_timeout: Duration,
    /// Read buffer size for socket reads.
    pub read_buffer_size: usize,
}

impl ConnectionConfig {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            format: WireFormat::Json,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }

    pub fn with_format(mut self, format: WireFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }
}

/// A connection to a hubbub broker.
pub struct Connection {
    config: ConnectionConfig,
    /// Write half of the stream (for sending commands).
    writer: Mutex<Option<OwnedWriteHalf>>,
    /// Read half of the stream (for receiving deliveries).
    reader: Mutex<Option<OwnedReadHalf>>,
    /// Decoder for reassembling frames.
    decoder: Mutex<FrameDecoder>,
    /// Publishes received while waiting for a listing reply.
    pending: Mutex<VecDeque<Message>>,
    /// Is the connection established?
    connected: AtomicBool,
}

impl Connection {
    /// Creates a new connection (not yet connected).
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            writer: Mutex::new(None),
            reader: Mutex::new(None),
            decoder: Mutex::new(FrameDecoder::new()),
            pending: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(false),
        }
    }

    /// Connects to the broker and sends the wire format handshake.
    pub async fn connect(&self) -> Result<(), ClientError> {
        tracing::debug!("Connecting to {}...", self.config.addr);

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.config.addr),
        )
        .await
        .map_err(|_| {
            tracing::debug!("Connection timeout");
            ClientError::Timeout
        })?
        .map_err(|e| {
            tracing::debug!("Connection failed: {}", e);
            ClientError::Io(e)
        })?;

        stream.set_nodelay(true).ok();

        let (read_half, mut write_half) = stream.into_split();

        // The handshake is a single frame; the broker sends nothing back.
        let frame = encode_frame(self.config.format.handshake_payload())?;
        write_half.write_all(&frame).await.map_err(ClientError::Io)?;
        tracing::debug!("Handshake sent: {}", self.config.format);

        *self.writer.lock().await = Some(write_half);
        *self.reader.lock().await = Some(read_half);
        self.decoder.lock().await.clear();
        self.pending.lock().await.clear();

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Sends one command frame.
    pub async fn send(&self, message: &Message) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }

        let frame = encode_message(message, self.config.format)?;
        let mut writer_guard = self.writer.lock().await;
        let writer = writer_guard.as_mut().ok_or(ClientError::NotConnected)?;
        writer.write_all(&frame).await.map_err(ClientError::Io)?;
        tracing::debug!("Sent {} ({} bytes)", message.command_tag(), frame.len());
        Ok(())
    }

    /// Reads the next complete message from the socket.
    async fn recv_message(&self) -> Result<Message, ClientError> {
        let mut buf = vec![0u8; self.config.read_buffer_size];

        loop {
            if let Some(payload) = self.decoder.lock().await.next_frame() {
                return Ok(decode_payload(&payload, self.config.format)?);
            }

            let n = {
                let mut reader_guard = self.reader.lock().await;
                let reader = reader_guard.as_mut().ok_or(ClientError::NotConnected)?;
                reader.read(&mut buf).await.map_err(ClientError::Io)?
            };

            if n == 0 {
                tracing::debug!("Connection closed by broker");
                self.connected.store(false, Ordering::SeqCst);
                return Err(ClientError::ConnectionClosed);
            }

            self.decoder.lock().await.extend(&buf[..n]);
        }
    }

    /// Waits for the next published message and returns its topic and value.
    ///
    /// Publishes queued while a listing reply was awaited are returned
    /// first, in arrival order.
    pub async fn pull(&self) -> Result<(String, Value), ClientError> {
        if let Some(Message::Publish { topic, value }) = self.pending.lock().await.pop_front() {
            return Ok((topic, value));
        }

        loop {
            match self.recv_message().await? {
                Message::Publish { topic, value } => return Ok((topic, value)),
                other => {
                    tracing::debug!("Ignoring unexpected message: {:?}", other);
                }
            }
        }
    }

    /// Requests the broker-wide subscription listing and waits for the reply.
    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionEntry>, ClientError> {
        self.send(&Message::ListAll).await?;

        tokio::time::timeout(self.config.request_timeout, async {
            loop {
                match self.recv_message().await? {
                    Message::Subscriptions { entries } => return Ok(entries),
                    publish @ Message::Publish { .. } => {
                        // Fan-out keeps flowing while the reply is pending.
                        self.pending.lock().await.push_back(publish);
                    }
                    other => {
                        tracing::debug!("Ignoring unexpected message: {:?}", other);
                    }
                }
            }
        })
        .await
        .map_err(|_| ClientError::Timeout)?
    }

    /// Returns whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of publishes queued for [`pull`](Self::pull).
    pub fn pending_count(&self) -> usize {
        self.pending.try_lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Closes the connection.
    pub async fn close(&self) -> Result<(), ClientError> {
        tracing::debug!("Closing connection...");
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        let _ = self.reader.lock().await.take();
        self.pending.lock().await.clear();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ConnectionConfig::new("127.0.0.1:5000".parse().unwrap());
        assert_eq!(config.format, WireFormat::Json);
        assert_eq!(config.read_buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_buffer_clamping() {
        let config =
            ConnectionConfig::new("127.0.0.1:5000".parse().unwrap()).with_read_buffer_size(100);
        assert_eq!(config.read_buffer_size, MIN_READ_BUFFER_SIZE);

        let config = ConnectionConfig::new("127.0.0.1:5000".parse().unwrap())
            .with_read_buffer_size(10 * 1024 * 1024);
        assert_eq!(config.read_buffer_size, MAX_READ_BUFFER_SIZE);
    }

    #[test]
    fn test_config_format_builder() {
        let config = ConnectionConfig::new("127.0.0.1:5000".parse().unwrap())
            .with_format(WireFormat::Binary);
        assert_eq!(config.format, WireFormat::Binary);
    }
}
