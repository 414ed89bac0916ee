//! Transport seam for upstream connections
//!
//! Sessions never open sockets directly; they ask a [`Connector`]. Production
//! uses [`TcpConnector`], tests substitute in-memory streams.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Byte stream to a broadcast server
pub trait UpstreamIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> UpstreamIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Boxed upstream stream as handed to a session
pub type UpstreamStream = Box<dyn UpstreamIo>;

/// Opens connections to the broadcast server
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> io::Result<UpstreamStream>;
}

/// Plain TCP connector
#[derive(Debug, Clone)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    /// Enable or disable TCP_NODELAY on new sockets
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> io::Result<UpstreamStream> {
        let socket = TcpStream::connect((host, port)).await?;
        if self.nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(Box::new(socket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connector_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = TcpConnector::new().connect("127.0.0.1", port).await.unwrap();
        stream.write_all(b"hello").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_tcp_connector_refused() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(TcpConnector::new().connect("127.0.0.1", port).await.is_err());
    }
}
