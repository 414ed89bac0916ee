//! Broadcast server compatibility quirks
//!
//! SOURCE servers disagree on almost everything after the request line.
//! This module documents the behaviors the relay has to tolerate and
//! identifies which server it is talking to, for logs and stats.
//!
//! # Known Quirks
//!
//! ## Icecast 2
//! - Answers `HTTP/1.0 200 OK` and then stays silent
//! - Rejects bad credentials with `401`, a busy or forbidden mount with `403`
//! - Unknown mounts on some setups answer `404`
//!
//! ## Shoutcast v1 / v2 legacy source port
//! - Speaks the ICY dialect; replies `OK2` plus `icy-caps` lines on success
//! - Sends the literal `invalid password` instead of a status code
//!
//! ## Liquidsoap Harbor
//! - Often sends nothing at all on success, so silence for the acceptance
//!   timeout is treated as acceptance
//! - Accepts either dialect; a mount that no input listens on gives `404`

use super::response::ResponseBuffer;

/// Detected broadcast server family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerKind {
    #[default]
    Unknown,
    Icecast,
    Shoutcast,
    Liquidsoap,
    Other,
}

impl ServerKind {
    /// Detect from a `Server:` header value
    pub fn from_server_header(value: &str) -> Self {
        let lower = value.to_lowercase();

        if lower.contains("icecast") {
            ServerKind::Icecast
        } else if lower.contains("shoutcast") {
            ServerKind::Shoutcast
        } else if lower.contains("liquidsoap") || lower.contains("harbor") {
            ServerKind::Liquidsoap
        } else {
            ServerKind::Other
        }
    }

    /// Detect from a buffered handshake response.
    ///
    /// An empty buffer means the server accepted by staying silent.
    pub fn from_response(response: &ResponseBuffer) -> Self {
        if let Some(server) = response.header("Server") {
            return Self::from_server_header(&server);
        }
        if response.header("icy-caps").is_some() {
            return ServerKind::Shoutcast;
        }
        match response.status_line() {
            Some(line) if line.starts_with("OK2") => ServerKind::Shoutcast,
            Some(_) => ServerKind::Other,
            None => ServerKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::Unknown => "unknown",
            ServerKind::Icecast => "icecast",
            ServerKind::Shoutcast => "shoutcast",
            ServerKind::Liquidsoap => "liquidsoap",
            ServerKind::Other => "other",
        }
    }
}

impl std::fmt::Display for ServerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_server_header() {
        assert_eq!(
            ServerKind::from_server_header("Icecast 2.4.4"),
            ServerKind::Icecast
        );
        assert_eq!(
            ServerKind::from_server_header("SHOUTcast Distributed Network Audio Server"),
            ServerKind::Shoutcast
        );
        assert_eq!(
            ServerKind::from_server_header("Liquidsoap/2.2.0"),
            ServerKind::Liquidsoap
        );
        assert_eq!(ServerKind::from_server_header("nginx"), ServerKind::Other);
    }

    #[test]
    fn test_from_response() {
        let mut buf = ResponseBuffer::new();
        assert_eq!(ServerKind::from_response(&buf), ServerKind::Unknown);

        buf.extend(b"OK2\r\nicy-caps:11\r\n\r\n");
        assert_eq!(ServerKind::from_response(&buf), ServerKind::Shoutcast);

        buf.clear();
        buf.extend(b"HTTP/1.0 200 OK\r\nServer: Icecast 2.4.4\r\n\r\n");
        assert_eq!(ServerKind::from_response(&buf), ServerKind::Icecast);

        buf.clear();
        buf.extend(b"HTTP/1.0 200 OK\r\n\r\n");
        assert_eq!(ServerKind::from_response(&buf), ServerKind::Other);
    }
}
