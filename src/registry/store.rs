//! Session registry implementation

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

use super::entry::SessionEntry;
use super::error::RegistryError;
use crate::client::{Connector, RelayConfig, TcpConnector};
use crate::protocol::message::{Notification, StartStream};
use crate::session::{spawn_session, ProducerId, SessionContext, SessionId, SessionSummary};
use crate::stats::{RelayStats, SessionStats};

/// Registry of relay sessions, one per producer
///
/// Thread-safe via `RwLock`. Audio routing only needs a read lock; starting
/// and stopping sessions take the write lock briefly.
pub struct SessionRegistry {
    /// Map of producer to session entry
    sessions: RwLock<HashMap<ProducerId, SessionEntry>>,

    /// Shared relay configuration
    config: Arc<RelayConfig>,

    /// How sessions reach the broadcast server
    connector: Arc<dyn Connector>,

    next_session_id: AtomicU64,
    total_sessions: AtomicU64,
    created_at: Instant,
}

impl SessionRegistry {
    /// Registry connecting over plain TCP
    pub fn new(config: RelayConfig) -> Self {
        Self::with_connector(config, Arc::new(TcpConnector::new()))
    }

    /// Registry using a custom connector
    pub fn with_connector(config: RelayConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config: Arc::new(config),
            connector,
            next_session_id: AtomicU64::new(1),
            total_sessions: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    /// Get the relay configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start a session for `producer`
    ///
    /// Fails with `AlreadyStreaming` while the producer's previous session is
    /// still running. A finished session is replaced.
    pub async fn start(
        &self,
        producer: ProducerId,
        start: StartStream,
        notifier: mpsc::UnboundedSender<Notification>,
    ) -> Result<SessionId, RegistryError> {
        let mut sessions = self.sessions.write().await;

        if let Some(entry) = sessions.get(&producer) {
            if entry.is_live() {
                return Err(RegistryError::AlreadyStreaming(producer));
            }
            tracing::debug!(
                producer = producer,
                session_id = entry.session_id(),
                "Replacing finished session"
            );
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let context = SessionContext::from_start(session_id, producer, start, &self.config);
        let handle = spawn_session(
            context,
            Arc::clone(&self.config),
            Arc::clone(&self.connector),
            notifier,
        );

        sessions.insert(producer, SessionEntry::new(handle));
        self.total_sessions.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            producer = producer,
            session_id = session_id,
            sessions = sessions.len(),
            "Session registered"
        );

        Ok(session_id)
    }

    /// Route a chunk of audio to the producer's session
    pub async fn send_audio(&self, producer: ProducerId, chunk: Bytes) -> Result<(), RegistryError> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(&producer)
            .ok_or(RegistryError::SessionNotFound(producer))?;

        if entry.handle.send_audio(chunk) {
            Ok(())
        } else {
            Err(RegistryError::SessionEnded(producer))
        }
    }

    /// Route a now-playing update to the producer's session
    pub async fn update_metadata(
        &self,
        producer: ProducerId,
        title: String,
        artist: String,
    ) -> Result<(), RegistryError> {
        let sessions = self.sessions.read().await;
        let entry = sessions
            .get(&producer)
            .ok_or(RegistryError::SessionNotFound(producer))?;

        if entry.handle.update_metadata(title, artist) {
            Ok(())
        } else {
            Err(RegistryError::SessionEnded(producer))
        }
    }

    /// Stop and remove the producer's session
    ///
    /// Waits for the worker to close its socket, up to the configured grace.
    pub async fn stop(&self, producer: ProducerId) -> Option<SessionSummary> {
        let entry = self.sessions.write().await.remove(&producer)?;

        entry.handle.stop();
        let summary = entry.handle.join(self.config.shutdown_grace).await;

        tracing::info!(
            producer = producer,
            duration_secs = entry.started_at.elapsed().as_secs(),
            "Session unregistered"
        );
        summary
    }

    /// Stop every session
    pub async fn shutdown(&self) {
        let producers: Vec<ProducerId> = self.sessions.read().await.keys().copied().collect();
        for producer in producers {
            self.stop(producer).await;
        }
    }

    /// Check if the producer has a running session
    pub async fn has_session(&self, producer: ProducerId) -> bool {
        self.sessions
            .read()
            .await
            .get(&producer)
            .map_or(false, SessionEntry::is_live)
    }

    /// Latest statistics of the producer's session
    pub async fn session_stats(&self, producer: ProducerId) -> Option<SessionStats> {
        self.sessions.read().await.get(&producer).map(SessionEntry::stats)
    }

    /// Number of registered sessions, finished ones included until cleanup
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Remove sessions whose worker has ended
    pub async fn cleanup(&self) {
        let mut sessions = self.sessions.write().await;

        let finished: Vec<ProducerId> = sessions
            .iter()
            .filter(|(_, entry)| !entry.is_live())
            .map(|(producer, _)| *producer)
            .collect();

        for producer in finished {
            if let Some(entry) = sessions.remove(&producer) {
                let stats = entry.stats();
                tracing::info!(
                    producer = producer,
                    session_id = stats.session_id,
                    phase = %stats.phase,
                    bytes = stats.bytes_forwarded,
                    "Session removed by cleanup"
                );
            }
        }
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        // `interval` panics on a zero period
        let period = interval.max(Duration::from_millis(100));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }

    /// Relay-wide statistics
    pub async fn stats(&self) -> RelayStats {
        let sessions = self.sessions.read().await;

        RelayStats {
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: sessions.values().filter(|e| e.is_live()).count(),
            bytes_forwarded: sessions.values().map(|e| e.stats().bytes_forwarded).sum(),
            uptime: self.created_at.elapsed(),
        }
    }
}
