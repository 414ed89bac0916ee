//! Ingest server listener
//!
//! Handles the TCP accept loop, upgrades each connection to WebSocket and
//! spawns a producer connection for it.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::client::RelayConfig;
use crate::error::Result;
use crate::registry::SessionRegistry;
use crate::server::config::ServerConfig;
use crate::server::connection::ProducerConnection;

/// WebSocket ingest server
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    next_producer_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a server relaying to the broadcast server in `relay`
    pub fn new(config: ServerConfig, relay: RelayConfig) -> Self {
        Self::with_registry(config, Arc::new(SessionRegistry::new(relay)))
    }

    /// Create a server around an existing registry
    pub fn with_registry(config: ServerConfig, registry: Arc<SessionRegistry>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            registry,
            next_producer_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            target = %self.registry.config().target(),
            "Relay server listening"
        );
        Ok(listener)
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Serve producers on an already bound listener until `shutdown` resolves.
    ///
    /// Every running session is stopped before this returns.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let cleanup_handle = self
            .registry
            .spawn_cleanup_task(self.config.cleanup_interval);

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        // Stop cleanup task on shutdown
        cleanup_handle.abort();
        self.registry.shutdown().await;

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let producer = self.next_producer_id.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            producer = producer,
            peer = %peer_addr,
            "New connection"
        );

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(error = %e, "Failed to configure socket");
            return;
        }

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.config.max_message_size);
        ws_config.max_frame_size = Some(self.config.max_message_size);
        let handshake_timeout = self.config.handshake_timeout;
        let registry = Arc::clone(&self.registry);

        tokio::spawn(async move {
            // Held for the lifetime of the connection
            let _permit = permit;

            let upgrade = tokio_tungstenite::accept_async_with_config(socket, Some(ws_config));
            let ws = match tokio::time::timeout(handshake_timeout, upgrade).await {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    tracing::debug!(producer = producer, error = %e, "WebSocket upgrade failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!(producer = producer, "WebSocket upgrade timed out");
                    return;
                }
            };

            if let Err(e) = ProducerConnection::new(producer, registry).run(ws).await {
                tracing::debug!(
                    producer = producer,
                    error = %e,
                    "Connection error"
                );
            }

            tracing::debug!(producer = producer, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
