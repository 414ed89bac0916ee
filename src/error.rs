//! Error types
//!
//! Relay failures are split by how a session reacts to them:
//!
//! | Error              | Source                      | Session reaction            |
//! |--------------------|-----------------------------|-----------------------------|
//! | `Connect`          | socket connect/read/write   | retry with backoff          |
//! | `Protocol`         | unrecognized response       | retry with backoff          |
//! | `Authentication`   | 401 / 403                   | terminal                    |
//! | `MountUnavailable` | 404                         | advance mount, reconnect    |
//! | `MountsExhausted`  | no candidates left          | terminal                    |
//! | `BackoffExceeded`  | retry budget spent          | terminal                    |

use std::fmt;
use std::io;

use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error outside of a session (listener, socket setup)
    Io(io::Error),
    /// Upstream relay failure
    Relay(RelayError),
    /// Session registry failure
    Registry(RegistryError),
    /// Malformed ingest message
    Message(serde_json::Error),
    /// WebSocket transport failure on the ingest side
    WebSocket(tokio_tungstenite::tungstenite::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Relay(e) => write!(f, "Relay error: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Message(e) => write!(f, "Invalid message: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Relay(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Message(e) => Some(e),
            Error::WebSocket(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RelayError> for Error {
    fn from(e: RelayError) -> Self {
        Error::Relay(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Message(e)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

/// Failures while talking to the broadcast server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Socket-level failure (connect, read, write, unexpected close)
    Connect(String),
    /// Response could not be understood
    Protocol(String),
    /// Server refused the credentials (401/403)
    Authentication { status_line: String },
    /// Server does not accept sources on this mount (404)
    MountUnavailable { mount: String },
    /// Every candidate mount has been rejected
    MountsExhausted { tried: Vec<String> },
    /// Too many consecutive failed attempts
    BackoffExceeded { attempts: u32 },
}

impl RelayError {
    /// Whether the session gives up after this error
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelayError::Authentication { .. }
                | RelayError::MountsExhausted { .. }
                | RelayError::BackoffExceeded { .. }
        )
    }

    /// Short machine-readable code, used in producer notifications
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Connect(_) => "connect-error",
            RelayError::Protocol(_) => "protocol-error",
            RelayError::Authentication { .. } => "auth-failed",
            RelayError::MountUnavailable { .. } => "mount-unavailable",
            RelayError::MountsExhausted { .. } => "mount-exhausted",
            RelayError::BackoffExceeded { .. } => "backoff-exceeded",
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Connect(msg) => write!(f, "Connection failed: {}", msg),
            RelayError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            RelayError::Authentication { status_line } => {
                write!(f, "Authentication rejected: {}", status_line)
            }
            RelayError::MountUnavailable { mount } => write!(f, "Mount unavailable: {}", mount),
            RelayError::MountsExhausted { tried } => {
                write!(f, "All mount points rejected: {}", tried.join(", "))
            }
            RelayError::BackoffExceeded { attempts } => {
                write!(f, "Gave up after {} attempts", attempts)
            }
        }
    }
}

impl std::error::Error for RelayError {}

impl From<io::Error> for RelayError {
    fn from(e: io::Error) -> Self {
        RelayError::Connect(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(!RelayError::Connect("refused".into()).is_terminal());
        assert!(!RelayError::Protocol("garbage".into()).is_terminal());
        assert!(!RelayError::MountUnavailable { mount: "/".into() }.is_terminal());
        assert!(RelayError::Authentication {
            status_line: "HTTP/1.0 401 Unauthorized".into()
        }
        .is_terminal());
        assert!(RelayError::MountsExhausted { tried: vec![] }.is_terminal());
        assert!(RelayError::BackoffExceeded { attempts: 10 }.is_terminal());
    }

    #[test]
    fn test_io_error_is_connect_error() {
        let io = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: RelayError = io.into();
        assert!(matches!(err, RelayError::Connect(_)));
    }

    #[test]
    fn test_display() {
        let err = RelayError::MountsExhausted {
            tried: vec!["/".into(), "/live".into()],
        };
        assert_eq!(err.to_string(), "All mount points rejected: /, /live");
    }
}
