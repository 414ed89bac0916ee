//! WebSocket ingest server
//!
//! Browser producers connect over WebSocket, send JSON control messages and
//! binary audio frames, and receive status notifications. Each producer gets
//! at most one relay session in the shared [`SessionRegistry`].
//!
//! [`SessionRegistry`]: crate::registry::SessionRegistry

pub mod config;
mod connection;
pub mod listener;

pub use config::ServerConfig;
pub use listener::RelayServer;
