//! Registry error types

use crate::session::ProducerId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Producer has no session
    SessionNotFound(ProducerId),
    /// Producer already has a live session
    AlreadyStreaming(ProducerId),
    /// Producer's session has finished and no longer accepts commands
    SessionEnded(ProducerId),
}

impl RegistryError {
    /// Short machine-readable code, used in producer notifications
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::SessionNotFound(_) | RegistryError::SessionEnded(_) => "no-session",
            RegistryError::AlreadyStreaming(_) => "already-streaming",
        }
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::SessionNotFound(id) => write!(f, "No session for producer {}", id),
            RegistryError::AlreadyStreaming(id) => {
                write!(f, "Producer {} already has a live session", id)
            }
            RegistryError::SessionEnded(id) => write!(f, "Session for producer {} has ended", id),
        }
    }
}

impl std::error::Error for RegistryError {}
