//! TCP server implementation.
//!
//! The accept loop, the dispatch loop, and per-connection I/O tasks all run
//! under one `run()` call. Connection tasks never touch broker state: they
//! turn socket bytes into [`ConnEvent`]s for the dispatch loop and drain an
//! outbound queue back to the socket. The dispatch loop alone drives the
//! [`BrokerEngine`], so commands are processed one at a time.

use crate::config::Config;
use crate::engine::{BrokerEngine, ConnEvent};
use crate::error::ServerError;
use bytes::Bytes;
use hubbub_broker::ConnId;
use hubbub_protocol::{decode_payload, FrameDecoder, ProtocolError, WireFormat};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub commands_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// Capacity of the channel feeding the dispatch loop.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// TCP pub/sub server.
pub struct Server {
    config: Config,
    listener: TcpListener,
    local_addr: SocketAddr,
    stats: Arc<ServerStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl Server {
    /// Binds the listener. Connections are not accepted until
    /// [`run`](Self::run) is called.
    pub async fn bind(config: Config) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.network.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            config,
            listener,
            local_addr,
            stats: Arc::new(ServerStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Returns the bound listener address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept and dispatch loops until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Server listening on {}", self.local_addr);

        let mut engine = BrokerEngine::new();
        let (event_tx, mut event_rx) = mpsc::channel::<ConnEvent>(EVENT_CHANNEL_CAPACITY);
        let mut next_conn_id: u64 = 0;

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.network.max_connections as u64
                            {
                                tracing::warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            next_conn_id += 1;
                            let conn = ConnId(next_conn_id);
                            let events = event_tx.clone();
                            let stats = self.stats.clone();
                            let mut conn_shutdown = self.shutdown.subscribe();

                            tokio::spawn(async move {
                                let result = Self::handle_connection(
                                    conn,
                                    stream,
                                    addr,
                                    events.clone(),
                                    &mut conn_shutdown,
                                )
                                .await;

                                if let Err(e) = result {
                                    tracing::debug!("Connection {} error: {}", addr, e);
                                    stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                }

                                stats.connections_active.fetch_sub(1, Ordering::Relaxed);

                                // The engine tolerates Closed for connections
                                // that never completed a handshake.
                                let _ = events.send(ConnEvent::Closed { conn }).await;

                                tracing::info!("Client disconnected: {}", addr);
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                Some(event) = event_rx.recv() => {
                    if matches!(event, ConnEvent::Command { .. }) {
                        self.stats.commands_total.fetch_add(1, Ordering::Relaxed);
                    }
                    engine.handle_event(event);
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Server shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Handles a single connection: handshake, then frames until EOF.
    async fn handle_connection(
        conn: ConnId,
        mut stream: TcpStream,
        addr: SocketAddr,
        events: mpsc::Sender<ConnEvent>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!("Client connected: {}", addr);

        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 8192];

        // The first frame selects the wire format for the rest of the
        // connection's lifetime.
        let format = loop {
            if let Some(payload) = decoder.next_frame() {
                break WireFormat::from_handshake(&payload)?;
            }
            tokio::select! {
                result = stream.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            if decoder.has_partial() {
                                return Err(ProtocolError::TruncatedFrame {
                                    buffered: decoder.buffered(),
                                }
                                .into());
                            }
                            tracing::debug!("[{}] Closed before handshake", addr);
                            return Ok(());
                        }
                        Ok(n) => decoder.extend(&buf[..n]),
                        Err(e) => return Err(ServerError::Io(e)),
                    }
                }
                _ = shutdown.recv() => return Err(ServerError::ShuttingDown),
            }
        };
        tracing::debug!("[{}] Handshake complete: {}", addr, format);

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Bytes>();
        let (mut read_half, mut write_half) = stream.into_split();

        // Writer drains the outbound queue. It ends when the engine evicts
        // the connection and drops the sender.
        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                if write_half.write_all(&frame).await.is_err() {
                    break;
                }
            }
        });

        if events
            .send(ConnEvent::Opened {
                conn,
                addr,
                format,
                outbound: outbound_tx,
            })
            .await
            .is_err()
        {
            // Dispatch is gone, the server is stopping.
            return Ok(());
        }

        loop {
            // Drain complete frames before reading more bytes.
            while let Some(payload) = decoder.next_frame() {
                match decode_payload(&payload, format) {
                    Ok(message) => {
                        if events
                            .send(ConnEvent::Command { conn, message })
                            .await
                            .is_err()
                        {
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        // Malformed input never kills the connection.
                        tracing::debug!("[{}] Discarding undecodable payload: {}", addr, e);
                    }
                }
            }

            tokio::select! {
                result = read_half.read(&mut buf) => {
                    match result {
                        Ok(0) => {
                            if decoder.has_partial() {
                                return Err(ProtocolError::TruncatedFrame {
                                    buffered: decoder.buffered(),
                                }
                                .into());
                            }
                            tracing::debug!("[{}] Connection closed by client", addr);
                            return Ok(());
                        }
                        Ok(n) => {
                            tracing::debug!("[{}] Received {} bytes", addr, n);
                            decoder.extend(&buf[..n]);
                        }
                        Err(e) => {
                            tracing::debug!("[{}] Read error: {}", addr, e);
                            return Err(ServerError::Io(e));
                        }
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("[{}] Shutdown signal received", addr);
                    return Err(ServerError::ShuttingDown);
                }
            }
        }
    }

    /// Initiates server shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the server is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }
}
