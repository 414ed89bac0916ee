//! Upstream connection to a broadcast server
//!
//! Owns one socket, split into halves so the session can watch for the
//! server closing while it writes audio. The SOURCE request goes out as soon
//! as the socket connects; response bytes collect in a [`ResponseBuffer`].

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::Instant;

use super::connector::{Connector, UpstreamStream};
use crate::error::RelayError;
use crate::protocol::constants::RESPONSE_READ_SIZE;
use crate::protocol::quirks::ServerKind;
use crate::protocol::response::{ResponseBuffer, ResponseClass};

/// One open connection to the broadcast server
pub struct UpstreamConnection {
    reader: ReadHalf<UpstreamStream>,
    writer: WriteHalf<UpstreamStream>,
    mount: String,
    response: ResponseBuffer,
    request_sent_at: Instant,
}

impl UpstreamConnection {
    /// Connect and send the SOURCE request.
    ///
    /// Connect and request write share `timeout`; running out is a connect error.
    pub async fn establish(
        connector: &dyn Connector,
        host: &str,
        port: u16,
        mount: String,
        request: Bytes,
        timeout: Duration,
    ) -> Result<Self, RelayError> {
        let attempt = async {
            let stream = connector.connect(host, port).await?;
            Self::open(stream, mount, &request).await
        };

        match tokio::time::timeout(timeout, attempt).await {
            Ok(result) => result.map_err(RelayError::from),
            Err(_) => Err(RelayError::Connect(format!(
                "timed out connecting to {}:{}",
                host, port
            ))),
        }
    }

    /// Wrap an already connected stream and send `request` on it
    pub async fn open(stream: UpstreamStream, mount: String, request: &[u8]) -> io::Result<Self> {
        let (reader, mut writer) = tokio::io::split(stream);
        writer.write_all(request).await?;
        writer.flush().await?;

        Ok(Self {
            reader,
            writer,
            mount,
            response: ResponseBuffer::new(),
            request_sent_at: Instant::now(),
        })
    }

    /// Mount this connection was opened for
    pub fn mount(&self) -> &str {
        &self.mount
    }

    /// When the SOURCE request finished sending
    pub fn request_sent_at(&self) -> Instant {
        self.request_sent_at
    }

    /// Read more of the handshake response.
    ///
    /// Returns the number of bytes read; 0 means the server closed the socket.
    /// Cancel safe: nothing is consumed unless the read completes.
    pub async fn read_response(&mut self) -> io::Result<usize> {
        let mut buf = [0u8; RESPONSE_READ_SIZE];
        let n = self.reader.read(&mut buf).await?;
        self.response.extend(&buf[..n]);
        Ok(n)
    }

    pub fn response(&self) -> &ResponseBuffer {
        &self.response
    }

    pub fn classify(&self) -> ResponseClass {
        self.response.classify()
    }

    /// Server family, as far as the response reveals it
    pub fn server_kind(&self) -> ServerKind {
        ServerKind::from_response(&self.response)
    }

    /// Read and write halves, for watching the socket while writing audio
    pub fn halves(&mut self) -> (&mut ReadHalf<UpstreamStream>, &mut WriteHalf<UpstreamStream>) {
        (&mut self.reader, &mut self.writer)
    }

    /// Shut down the write side, waiting at most `grace`
    pub async fn close(mut self, grace: Duration) {
        if tokio::time::timeout(grace, self.writer.shutdown())
            .await
            .is_err()
        {
            tracing::debug!(mount = %self.mount, "Upstream shutdown timed out");
        }
    }
}

impl std::fmt::Debug for UpstreamConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamConnection")
            .field("mount", &self.mount)
            .field("response_bytes", &self.response.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_sends_request_and_reads_response() {
        let (client, mut server) = tokio::io::duplex(1024);

        let request = b"SOURCE /live HTTP/1.0\r\n\r\n";
        let mut conn = UpstreamConnection::open(Box::new(client), "/live".into(), request)
            .await
            .unwrap();
        assert_eq!(conn.mount(), "/live");

        let mut request = [0u8; 25];
        server.read_exact(&mut request).await.unwrap();
        assert_eq!(&request, b"SOURCE /live HTTP/1.0\r\n\r\n");

        server.write_all(b"HTTP/1.0 200 OK\r\n").await.unwrap();
        conn.read_response().await.unwrap();
        assert_eq!(conn.classify(), ResponseClass::Accepted);
    }

    #[tokio::test]
    async fn test_read_response_reports_close() {
        let (client, server) = tokio::io::duplex(1024);
        let mut conn = UpstreamConnection::open(Box::new(client), "/".into(), b"x")
            .await
            .unwrap();

        drop(server);
        assert_eq!(conn.read_response().await.unwrap(), 0);
        assert_eq!(conn.classify(), ResponseClass::Incomplete);
    }

    #[tokio::test]
    async fn test_icy_rejection_from_scripted_server() {
        let request = b"SOURCE /live ICY/1.0\r\nAuthorization: source dj:pw\r\n\r\n";
        let mock = tokio_test::io::Builder::new()
            .write(request)
            .read(b"ICY 401 Service Unavailable\r\n")
            .build();

        let mut conn = UpstreamConnection::open(Box::new(mock), "/live".into(), request)
            .await
            .unwrap();
        conn.read_response().await.unwrap();

        assert_eq!(conn.classify(), ResponseClass::AuthRejected);
        assert_eq!(
            conn.response().status_line().as_deref(),
            Some("ICY 401 Service Unavailable")
        );
    }
}
