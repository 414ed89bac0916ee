//! Statistics for relay sessions

use std::time::Duration;

use crate::protocol::quirks::ServerKind;
use crate::session::SessionPhase;

/// Session-level statistics
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// Session ID
    pub session_id: u64,
    /// Current lifecycle phase
    pub phase: SessionPhase,
    /// Mount currently targeted
    pub mount: String,
    /// Position of that mount in the candidate list
    pub mount_index: usize,
    /// Server family detected on the last accepted handshake
    pub server_kind: ServerKind,
    /// Bytes written to the broadcast server
    pub bytes_forwarded: u64,
    /// Chunks fully written to the broadcast server
    pub chunks_forwarded: u64,
    /// Chunks dropped by the flow controller
    pub chunks_evicted: u64,
    /// Chunks waiting in the queue
    pub queued_chunks: usize,
    /// Times the session went back to retrying
    pub reconnects: u32,
    /// Connections opened
    pub connect_attempts: u32,
    /// Time spent streaming
    pub duration: Duration,
    /// Average bitrate while streaming (bits/sec)
    pub bitrate: u64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            session_id: 0,
            phase: SessionPhase::Idle,
            mount: String::new(),
            mount_index: 0,
            server_kind: ServerKind::Unknown,
            bytes_forwarded: 0,
            chunks_forwarded: 0,
            chunks_evicted: 0,
            queued_chunks: 0,
            reconnects: 0,
            connect_attempts: 0,
            duration: Duration::ZERO,
            bitrate: 0,
        }
    }
}

impl SessionStats {
    pub fn new(session_id: u64) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }

    /// Calculate bitrate from bytes and duration
    pub fn calculate_bitrate(&mut self) {
        let secs = self.duration.as_secs();
        if secs > 0 {
            self.bitrate = (self.bytes_forwarded * 8) / secs;
        }
    }
}

/// Relay-wide statistics
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Sessions started since the registry was created
    pub total_sessions: u64,
    /// Sessions whose worker is still running
    pub active_sessions: usize,
    /// Bytes forwarded by the sessions currently registered
    pub bytes_forwarded: u64,
    /// Time since the registry was created
    pub uptime: Duration,
}
