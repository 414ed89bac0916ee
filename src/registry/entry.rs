//! Session entry stored in the registry

use std::time::Instant;

use crate::session::{SessionHandle, SessionId};
use crate::stats::SessionStats;

/// Entry for a single producer's session
#[derive(Debug)]
pub struct SessionEntry {
    /// Handle to the running worker
    pub handle: SessionHandle,

    /// When the session was started
    pub started_at: Instant,
}

impl SessionEntry {
    pub(super) fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            started_at: Instant::now(),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.handle.id()
    }

    /// Whether the worker is still running
    pub fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stats(&self) -> SessionStats {
        self.handle.stats()
    }
}
