//! Protocol constants for SOURCE/ICY upstreams

use std::time::Duration;

/// Mount points tried when none are configured, in order
pub const DEFAULT_MOUNTS: &[&str] = &["/", "/stream", "/live", "/radio.mp3"];

/// Username Icecast expects for source clients
pub const DEFAULT_SOURCE_USER: &str = "source";

/// Content type used when the producer does not send one
pub const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// User-Agent sent with every SOURCE request
pub const DEFAULT_USER_AGENT: &str = concat!("harbor-relay/", env!("CARGO_PKG_VERSION"));

/// Silence after the request is treated as acceptance once this elapses
pub const DEFAULT_ACCEPTANCE_TIMEOUT: Duration = Duration::from_millis(1000);

/// TCP connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// First reconnect delay
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Upper bound for reconnect delays
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Consecutive failed attempts before a session gives up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Flow controller capacity in chunks
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Largest handshake response we buffer before giving up on it
pub const MAX_RESPONSE_SIZE: usize = 8 * 1024;

/// Read size while waiting for the handshake response
pub const RESPONSE_READ_SIZE: usize = 1024;

/// Line terminator for request and response headers
pub const CRLF: &str = "\r\n";
