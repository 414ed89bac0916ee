//! Relay sessions
//!
//! A session relays one producer's audio to one broadcast server mount.
//! It runs as its own task and is driven through a [`SessionHandle`]:
//!
//! ```text
//!   SessionHandle ── SessionCommand ──► SessionWorker ── bytes ──► server
//!        ▲                                   │
//!        └── watch<SessionStats> ◄───────────┤
//!   producer ◄──────── Notification ─────────┘
//! ```

pub mod context;
pub mod event;
pub mod flow;
pub mod state;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub use context::SessionContext;
pub use event::{SessionCommand, StatusEvent};
pub use flow::{DrainProgress, FlowController};
pub use state::{RejectReason, SessionPhase, SessionState, Step};

use crate::client::{Connector, RelayConfig};
use crate::error::RelayError;
use crate::protocol::message::Notification;
use crate::stats::SessionStats;
use worker::SessionWorker;

/// Unique session identifier
pub type SessionId = u64;

/// Identifier of a producer connection
pub type ProducerId = u64;

/// Final report of a finished session
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub producer: ProducerId,
    /// Phase the session ended in
    pub phase: SessionPhase,
    /// Last failure seen, if any
    pub last_error: Option<RelayError>,
    pub stats: SessionStats,
}

/// Handle to a running session
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
    stats: watch::Receiver<SessionStats>,
    task: JoinHandle<SessionSummary>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queue a chunk of audio. Returns false once the session has ended.
    pub fn send_audio(&self, chunk: Bytes) -> bool {
        self.commands.send(SessionCommand::Audio(chunk)).is_ok()
    }

    /// Forward a now-playing update
    pub fn update_metadata(&self, title: impl Into<String>, artist: impl Into<String>) -> bool {
        self.commands
            .send(SessionCommand::Metadata {
                title: title.into(),
                artist: artist.into(),
            })
            .is_ok()
    }

    /// Ask the session to close
    pub fn stop(&self) -> bool {
        self.commands.send(SessionCommand::Stop).is_ok()
    }

    /// Whether the worker task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Latest statistics published by the worker
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }

    /// Receiver that sees every stats update
    pub fn watch_stats(&self) -> watch::Receiver<SessionStats> {
        self.stats.clone()
    }

    /// Wait for the worker to finish, aborting it after `grace`
    pub async fn join(mut self, grace: Duration) -> Option<SessionSummary> {
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(summary)) => Some(summary),
            Ok(Err(e)) => {
                tracing::warn!(session_id = self.id, error = %e, "Session task failed");
                None
            }
            Err(_) => {
                tracing::warn!(session_id = self.id, "Session did not stop in time, aborting");
                self.task.abort();
                None
            }
        }
    }
}

/// Spawn a session worker and return its handle.
///
/// Notifications for the producer go to `notifier`.
pub fn spawn_session(
    context: SessionContext,
    config: Arc<RelayConfig>,
    connector: Arc<dyn Connector>,
    notifier: mpsc::UnboundedSender<Notification>,
) -> SessionHandle {
    let id = context.session_id;
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (stats_tx, stats_rx) = watch::channel(SessionStats::new(id));

    let task = tokio::spawn(async move {
        SessionWorker::new(context, config, connector, commands_rx, notifier, stats_tx)
            .run()
            .await
    });

    SessionHandle {
        id,
        commands: commands_tx,
        stats: stats_rx,
        task,
    }
}
