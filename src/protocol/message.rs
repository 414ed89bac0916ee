//! Ingest messages exchanged with the browser producer
//!
//! Text frames carry JSON objects tagged by `type`; binary frames carry raw
//! encoded audio, one frame per chunk.
//!
//! ```text
//! producer -> relay                      relay -> producer
//! ─────────────────                      ─────────────────
//! hello / start-stream {user, ...}       bridge-connected
//! metadata {title, artist}               stream-bridge-ready {success}
//! stop-stream                            stream-status {status, bytesTransferred}
//! ping                                   stream-error {error, message}
//! <binary audio>                         auth_error / mount-exhausted / pong
//! ```

use serde::{Deserialize, Serialize};

use super::constants::DEFAULT_CONTENT_TYPE;
use super::handshake::IceMetadata;

/// Control message sent by the producer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ControlMessage {
    /// Open a relay session. `hello` is the older name for the same request.
    #[serde(alias = "hello")]
    StartStream(StartStream),

    /// Now-playing update, forwarded best-effort
    Metadata {
        #[serde(default)]
        title: String,
        #[serde(default)]
        artist: String,
    },

    /// Close the relay session
    StopStream,

    /// Keepalive
    Ping,
}

impl ControlMessage {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Parameters of a `start-stream` request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartStream {
    #[serde(default, alias = "username")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_mime", alias = "contentType")]
    pub mime: String,
    #[serde(default)]
    pub mount: Option<String>,
    #[serde(default)]
    pub ice_metadata: Option<IceMetadata>,
}

fn default_mime() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

/// Coarse session status reported in `stream-status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamStatus {
    Connecting,
    Connected,
    Streaming,
    Reconnecting,
    MountRejected,
    Disconnected,
}

/// Notification sent to the producer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Notification {
    #[serde(rename = "bridge-connected")]
    BridgeConnected,

    #[serde(rename = "stream-bridge-ready")]
    StreamBridgeReady { success: bool },

    #[serde(rename = "auth_error")]
    AuthError { message: String },

    #[serde(rename = "mount-exhausted")]
    MountExhausted { mounts: Vec<String> },

    #[serde(rename = "stream-status", rename_all = "camelCase")]
    StreamStatus {
        status: StreamStatus,
        bytes_transferred: u64,
    },

    #[serde(rename = "stream-error")]
    StreamError { error: String, message: String },

    #[serde(rename = "pong")]
    Pong,
}

impl Notification {
    pub fn status(status: StreamStatus, bytes_transferred: u64) -> Self {
        Notification::StreamStatus {
            status,
            bytes_transferred,
        }
    }

    pub fn error(error: impl Into<String>, message: impl Into<String>) -> Self {
        Notification::StreamError {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
