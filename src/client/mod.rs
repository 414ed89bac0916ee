//! Upstream client side of the relay
//!
//! Everything needed to reach a broadcast server:
//! - [`config`]: shared relay configuration
//! - [`connector`]: transport seam (TCP in production)
//! - [`connection`]: one socket, its handshake request and response
//! - [`mount`]: ordered mount candidates
//! - [`backoff`]: reconnect delays

pub mod backoff;
pub mod config;
pub mod connection;
pub mod connector;
pub mod mount;

pub use backoff::BackoffPolicy;
pub use config::RelayConfig;
pub use connection::UpstreamConnection;
pub use connector::{Connector, TcpConnector, UpstreamIo, UpstreamStream};
pub use mount::MountResolver;
