//! Session inputs and outputs
//!
//! Commands flow from the producer into the worker; status events flow out
//! of the state machine and become [`Notification`]s for the producer.

use std::time::Duration;

use bytes::Bytes;

use crate::error::RelayError;
use crate::protocol::message::{Notification, StreamStatus};

/// Command sent to a session worker
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// One chunk of encoded audio
    Audio(Bytes),
    /// Now-playing update
    Metadata { title: String, artist: String },
    /// End the session
    Stop,
}

/// Observable state transition
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Connecting { mount: String, attempt: u32 },
    Handshaking { mount: String },
    Connected { mount: String },
    MountRejected { mount: String },
    Reconnecting {
        attempt: u32,
        delay: Duration,
        reason: String,
    },
    Disconnected,
    Failed(RelayError),
}

impl StatusEvent {
    /// Notifications reporting this event to the producer.
    ///
    /// `bytes` is the running total forwarded upstream.
    pub fn notifications(&self, bytes: u64) -> Vec<Notification> {
        match self {
            StatusEvent::Connecting { .. } => {
                vec![Notification::status(StreamStatus::Connecting, bytes)]
            }
            StatusEvent::Handshaking { .. } => Vec::new(),
            StatusEvent::Connected { .. } => vec![
                Notification::StreamBridgeReady { success: true },
                Notification::status(StreamStatus::Connected, bytes),
            ],
            StatusEvent::MountRejected { .. } => {
                vec![Notification::status(StreamStatus::MountRejected, bytes)]
            }
            StatusEvent::Reconnecting { .. } => {
                vec![Notification::status(StreamStatus::Reconnecting, bytes)]
            }
            StatusEvent::Disconnected => {
                vec![Notification::status(StreamStatus::Disconnected, bytes)]
            }
            // A producer still waiting on `stream-bridge-ready` gets a definite no
            StatusEvent::Failed(err) => vec![
                failure_notification(err),
                Notification::StreamBridgeReady { success: false },
            ],
        }
    }
}

fn failure_notification(err: &RelayError) -> Notification {
    match err {
        RelayError::Authentication { .. } => Notification::AuthError {
            message: err.to_string(),
        },
        RelayError::MountsExhausted { tried } => Notification::MountExhausted {
            mounts: tried.clone(),
        },
        other => Notification::error(other.code(), other.to_string()),
    }
}
