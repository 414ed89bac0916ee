//! Relay configuration
//!
//! One `RelayConfig` describes the broadcast target and how sessions talk
//! to it. Producer-supplied values (credentials, content type, station
//! metadata) come in per session; everything here is shared.

use std::time::Duration;

use super::backoff::BackoffPolicy;
use crate::protocol::constants::*;
use crate::protocol::handshake::{Dialect, IceMetadata};

/// Shared configuration for relay sessions
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Broadcast server host
    pub host: String,

    /// Broadcast server port
    pub port: u16,

    /// Request dialect
    pub dialect: Dialect,

    /// Mount candidates in trial order
    pub mounts: Vec<String>,

    /// User-Agent header value
    pub user_agent: String,

    /// Station defaults for `ice-*` headers the producer leaves unset
    pub station: IceMetadata,

    /// Connect (and request write) timeout
    pub connect_timeout: Duration,

    /// Silence after the request counts as acceptance once this elapses
    pub acceptance_timeout: Duration,

    /// Reconnect policy
    pub backoff: BackoffPolicy,

    /// Flow controller capacity in chunks
    pub queue_capacity: usize,

    /// Optional cap on queued bytes
    pub queue_max_bytes: Option<usize>,

    /// Reconnect when the server closes an established stream
    pub reconnect_on_drop: bool,

    /// Interval between `stream-status` reports while streaming
    pub status_interval: Duration,

    /// Time allowed for closing sockets and joining session tasks
    pub shutdown_grace: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            dialect: Dialect::Http,
            mounts: DEFAULT_MOUNTS.iter().map(|m| m.to_string()).collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            station: IceMetadata::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            acceptance_timeout: DEFAULT_ACCEPTANCE_TIMEOUT,
            backoff: BackoffPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_max_bytes: None,
            reconnect_on_drop: true,
            status_interval: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl RelayConfig {
    /// Config targeting `host:port` with defaults for everything else
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// `host:port` for logs and Host headers
    pub fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Set the request dialect
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set mount candidates, in trial order
    pub fn mounts<I, S>(mut self, mounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mounts = mounts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the User-Agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set station metadata defaults
    pub fn station(mut self, station: IceMetadata) -> Self {
        self.station = station;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the silence-means-accepted timeout
    pub fn acceptance_timeout(mut self, timeout: Duration) -> Self {
        self.acceptance_timeout = timeout;
        self
    }

    /// Set the reconnect policy
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set queue capacity in chunks (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Cap the bytes held in the queue
    pub fn queue_max_bytes(mut self, max_bytes: usize) -> Self {
        self.queue_max_bytes = Some(max_bytes);
        self
    }

    /// Choose whether a server-side close of a live stream reconnects
    pub fn reconnect_on_drop(mut self, reconnect: bool) -> Self {
        self.reconnect_on_drop = reconnect;
        self
    }

    /// Set the status report interval
    pub fn status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();

        assert_eq!(config.dialect, Dialect::Http);
        assert_eq!(config.mounts, vec!["/", "/stream", "/live", "/radio.mp3"]);
        assert_eq!(config.acceptance_timeout, Duration::from_millis(1000));
        assert_eq!(config.backoff.base, Duration::from_secs(1));
        assert_eq!(config.backoff.cap, Duration::from_secs(30));
        assert_eq!(config.queue_capacity, 64);
        assert!(config.queue_max_bytes.is_none());
        assert!(config.reconnect_on_drop);
    }

    #[test]
    fn test_target() {
        let config = RelayConfig::new("radio.example", 8010);
        assert_eq!(config.target(), "radio.example:8010");
    }

    #[test]
    fn test_builder_queue_capacity_at_least_one() {
        let config = RelayConfig::default().queue_capacity(0);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RelayConfig::new("localhost", 8000)
            .dialect(Dialect::Icy)
            .mounts(["/", "/live"])
            .user_agent("mixer/2.0")
            .acceptance_timeout(Duration::from_millis(250))
            .backoff(BackoffPolicy::new(
                Duration::from_millis(100),
                Duration::from_secs(2),
                3,
            ))
            .queue_capacity(5)
            .queue_max_bytes(4096)
            .reconnect_on_drop(false)
            .status_interval(Duration::from_secs(1));

        assert_eq!(config.dialect, Dialect::Icy);
        assert_eq!(config.mounts, vec!["/", "/live"]);
        assert_eq!(config.user_agent, "mixer/2.0");
        assert_eq!(config.acceptance_timeout, Duration::from_millis(250));
        assert_eq!(config.backoff.max_attempts, 3);
        assert_eq!(config.queue_capacity, 5);
        assert_eq!(config.queue_max_bytes, Some(4096));
        assert!(!config.reconnect_on_drop);
        assert_eq!(config.status_interval, Duration::from_secs(1));
    }
}
