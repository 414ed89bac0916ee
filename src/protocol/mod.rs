//! Wire protocols
//!
//! Two protocols meet in the relay:
//!
//! ```text
//!  browser producer                 relay                     broadcast server
//!  ───────────────── JSON + binary ─────► ── SOURCE / ICY over TCP ──►
//!                   ◄── status JSON ─────
//! ```
//!
//! - [`handshake`] builds the SOURCE request (both dialects)
//! - [`response`] classifies the server's answer
//! - [`quirks`] collects known server behaviors
//! - [`message`] defines the producer-facing ingest messages

pub mod constants;
pub mod handshake;
pub mod message;
pub mod quirks;
pub mod response;

pub use handshake::{Credentials, Dialect, IceMetadata, MetadataUpdate, SourceRequest};
pub use message::{ControlMessage, Notification, StartStream};
pub use quirks::ServerKind;
pub use response::{ResponseBuffer, ResponseClass};
