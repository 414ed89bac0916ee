//! # harbor-relay
//!
//! Relay live audio from browser producers to Icecast/Shoutcast-family
//! ("Harbor") SOURCE endpoints.
//!
//! A producer connects over WebSocket, asks for a stream with a
//! `start-stream` message and then sends encoded audio as binary frames.
//! For each producer the relay opens one raw TCP connection to the broadcast
//! server, performs the SOURCE handshake, walks the mount candidates on
//! `404`, reconnects with exponential backoff on failure, and forwards the
//! audio through a bounded drop-oldest queue.
//!
//! ```text
//!   browser ── WebSocket ──► RelayServer ──► SessionRegistry
//!                                                │
//!                                          SessionWorker (one per producer)
//!                                                │  SOURCE /mount HTTP/1.0
//!                                                ▼
//!                                        Icecast / Shoutcast / Harbor
//! ```
//!
//! # Example
//!
//! ```no_run
//! use harbor_relay::{RelayConfig, RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> harbor_relay::Result<()> {
//!     let relay = RelayConfig::new("radio.example", 8000).mounts(["/live", "/"]);
//!     let server = RelayServer::new(ServerConfig::default(), relay);
//!     server.run().await
//! }
//! ```

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use client::{BackoffPolicy, Connector, MountResolver, RelayConfig, TcpConnector};
pub use error::{Error, RelayError, Result};
pub use protocol::{ControlMessage, Credentials, Dialect, IceMetadata, Notification, StartStream};
pub use registry::{RegistryError, SessionRegistry};
pub use server::{RelayServer, ServerConfig};
pub use session::{SessionHandle, SessionPhase, SessionSummary};
pub use stats::{RelayStats, SessionStats};
