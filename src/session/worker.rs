//! Session worker
//!
//! One task per session owns the state machine, the flow controller and
//! the upstream socket. Each loop iteration waits for exactly one event
//! (a producer command, connect result, response bytes, a deadline, write
//! progress, or a status tick), feeds it to [`SessionState`], and carries
//! out the returned [`Step`].
//!
//! Producer commands are read in every phase, so audio keeps landing in the
//! flow controller while the worker connects, handshakes or backs off.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::context::SessionContext;
use super::event::{SessionCommand, StatusEvent};
use super::flow::{DrainProgress, FlowController};
use super::state::{SessionPhase, SessionState, Step};
use super::SessionSummary;
use crate::client::{Connector, RelayConfig, UpstreamConnection, UpstreamStream};
use crate::error::RelayError;
use crate::protocol::constants::RESPONSE_READ_SIZE;
use crate::protocol::message::{Notification, StreamStatus};
use crate::protocol::quirks::ServerKind;
use crate::protocol::response::ResponseClass;
use crate::stats::SessionStats;

type ConnectTask = JoinHandle<Result<UpstreamConnection, RelayError>>;

/// Everything that can wake the worker
#[derive(Debug)]
enum Event {
    /// Producer command; `None` once every sender is gone
    Command(Option<SessionCommand>),
    Connected(Result<UpstreamConnection, RelayError>),
    ResponseRead(io::Result<usize>),
    AcceptanceTimeout,
    RetryDue,
    Wrote(io::Result<DrainProgress>),
    /// Bytes the server sent while streaming; 0 means it closed
    UpstreamRead(io::Result<usize>),
    StatusTick,
}

pub(crate) struct SessionWorker {
    state: SessionState,
    context: SessionContext,
    config: Arc<RelayConfig>,
    connector: Arc<dyn Connector>,
    flow: FlowController,

    upstream: Option<UpstreamConnection>,
    pending_connect: Option<ConnectTask>,
    acceptance_deadline: Option<Instant>,
    server_kind: ServerKind,

    /// Metadata received before the stream was accepted
    pending_metadata: Option<(String, String)>,

    commands: mpsc::UnboundedReceiver<SessionCommand>,
    notifier: mpsc::UnboundedSender<Notification>,
    status_tick: Interval,
    stats: watch::Sender<SessionStats>,
}

impl SessionWorker {
    /// Must be called inside the runtime: the status ticker needs a timer.
    pub(crate) fn new(
        context: SessionContext,
        config: Arc<RelayConfig>,
        connector: Arc<dyn Connector>,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        notifier: mpsc::UnboundedSender<Notification>,
        stats: watch::Sender<SessionStats>,
    ) -> Self {
        let state = SessionState::new(
            context.session_id,
            context.mounts(&config),
            config.backoff,
            Instant::now(),
        );

        let mut flow = FlowController::new(config.queue_capacity);
        if let Some(max_bytes) = config.queue_max_bytes {
            flow = flow.with_max_bytes(max_bytes);
        }

        let period = config.status_interval.max(Duration::from_millis(100));
        let mut status_tick = tokio::time::interval_at(Instant::now() + period, period);
        status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            state,
            context,
            config,
            connector,
            flow,
            upstream: None,
            pending_connect: None,
            acceptance_deadline: None,
            server_kind: ServerKind::Unknown,
            pending_metadata: None,
            commands,
            notifier,
            status_tick,
            stats,
        }
    }

    /// Drive the session until it closes or is rejected
    pub(crate) async fn run(mut self) -> SessionSummary {
        tracing::info!(
            session_id = self.state.id,
            producer = self.context.producer,
            target = %self.config.target(),
            mounts = ?self.state.mounts().candidates(),
            "Session started"
        );

        let step = self.state.start(Instant::now());
        let mut running = self.apply(step).await;
        self.report();

        while running {
            let event = self.next_event().await;
            running = self.dispatch(event).await;
            self.report();
        }

        self.finish()
    }

    async fn next_event(&mut self) -> Event {
        let streaming = self.state.phase() == SessionPhase::Streaming;
        let upstream_event = wait_upstream(
            self.state.phase(),
            &mut self.pending_connect,
            &mut self.upstream,
            &mut self.flow,
            self.acceptance_deadline,
            self.state.next_retry_at(),
        );

        tokio::select! {
            command = self.commands.recv() => Event::Command(command),
            event = upstream_event => event,
            _ = self.status_tick.tick(), if streaming => Event::StatusTick,
        }
    }

    /// Feed one event to the state machine; false once the session is over
    async fn dispatch(&mut self, event: Event) -> bool {
        let now = Instant::now();

        let step = match event {
            Event::Command(Some(SessionCommand::Audio(chunk))) => {
                self.state.touch(now);
                let evicted = self.flow.enqueue(chunk);
                if evicted > 0 {
                    tracing::debug!(
                        session_id = self.state.id,
                        phase = %self.state.phase(),
                        evicted = evicted,
                        total_evicted = self.flow.evictions(),
                        "Queue full, dropped oldest audio"
                    );
                }
                Step::Stay
            }
            Event::Command(Some(SessionCommand::Metadata { title, artist })) => {
                if self.state.phase() == SessionPhase::Streaming {
                    self.send_metadata(title, artist);
                } else {
                    self.pending_metadata = Some((title, artist));
                }
                Step::Stay
            }
            Event::Command(Some(SessionCommand::Stop)) | Event::Command(None) => {
                self.state.stop(now)
            }

            Event::Connected(result) => {
                self.pending_connect = None;
                match result {
                    Ok(conn) => {
                        self.acceptance_deadline =
                            Some(conn.request_sent_at() + self.config.acceptance_timeout);
                        self.upstream = Some(conn);
                        self.state.on_connected()
                    }
                    Err(e) => self.state.on_failure(now, e),
                }
            }

            Event::ResponseRead(Ok(0)) => match self.buffered_rejection() {
                Some((class, line)) => self.state.on_response(class, &line, now),
                None => self.state.on_failure(
                    now,
                    RelayError::Connect("server closed the connection during handshake".into()),
                ),
            },
            Event::ResponseRead(Ok(_)) => match &self.upstream {
                Some(conn) => {
                    let class = conn.classify();
                    let line = conn.response().status_line().unwrap_or_default();
                    self.state.on_response(class, &line, now)
                }
                None => Step::Stay,
            },
            Event::ResponseRead(Err(e)) => self.state.on_failure(now, e.into()),

            Event::AcceptanceTimeout => match self.buffered_rejection() {
                Some((class, line)) => self.state.on_response(class, &line, now),
                None => self.state.on_acceptance_timeout(now),
            },

            Event::RetryDue => self.state.on_retry_due(now),

            Event::Wrote(Ok(progress)) => {
                let complete = matches!(progress, DrainProgress::Complete(_));
                self.state.record_forwarded(progress.bytes(), complete, now);
                Step::Stay
            }
            Event::Wrote(Err(e)) => {
                tracing::warn!(
                    session_id = self.state.id,
                    mount = %self.state.mount(),
                    error = %e,
                    "Upstream write failed"
                );
                self.state.on_failure(now, e.into())
            }

            Event::UpstreamRead(Ok(0)) => {
                tracing::info!(
                    session_id = self.state.id,
                    mount = %self.state.mount(),
                    "Server closed the stream"
                );
                self.state
                    .on_upstream_closed(now, self.config.reconnect_on_drop)
            }
            Event::UpstreamRead(Ok(n)) => {
                tracing::trace!(session_id = self.state.id, bytes = n, "Ignoring server bytes");
                Step::Stay
            }
            Event::UpstreamRead(Err(e)) => self.state.on_failure(now, e.into()),

            Event::StatusTick => {
                self.notify(Notification::status(
                    StreamStatus::Streaming,
                    self.state.bytes_forwarded(),
                ));
                Step::Stay
            }
        };

        self.apply(step).await
    }

    /// Carry out a step; false once the session is over
    async fn apply(&mut self, step: Step) -> bool {
        match step {
            Step::Stay => true,
            Step::Connect => {
                self.drop_upstream();
                self.spawn_connect();
                true
            }
            Step::Stream => {
                self.acceptance_deadline = None;
                if let Some(conn) = &self.upstream {
                    self.server_kind = conn.server_kind();
                }
                self.status_tick.reset();
                if let Some((title, artist)) = self.pending_metadata.take() {
                    self.send_metadata(title, artist);
                }
                true
            }
            Step::Wait(_) => {
                self.drop_upstream();
                true
            }
            Step::Finish => {
                self.close_upstream().await;
                false
            }
        }
    }

    /// Rejection visible in a partial response
    fn buffered_rejection(&self) -> Option<(ResponseClass, String)> {
        let response = self.upstream.as_ref()?.response();
        let class = response.rejection()?;
        Some((class, response.partial_line()))
    }

    fn spawn_connect(&mut self) {
        let mount = self.state.mount().to_string();
        let request = self.context.source_request(&mount, &self.config);
        let connector = Arc::clone(&self.connector);
        let config = Arc::clone(&self.config);

        self.pending_connect = Some(tokio::spawn(async move {
            UpstreamConnection::establish(
                connector.as_ref(),
                &config.host,
                config.port,
                mount,
                request,
                config.connect_timeout,
            )
            .await
        }));
    }

    /// Abandon the current socket and any connect in progress
    fn drop_upstream(&mut self) {
        if let Some(task) = self.pending_connect.take() {
            task.abort();
        }
        self.upstream = None;
        self.acceptance_deadline = None;
        self.flow.rewind();
    }

    async fn close_upstream(&mut self) {
        if let Some(task) = self.pending_connect.take() {
            task.abort();
        }
        if let Some(conn) = self.upstream.take() {
            conn.close(self.config.shutdown_grace).await;
        }
    }

    /// Push a now-playing update on a separate connection, best effort
    fn send_metadata(&self, title: String, artist: String) {
        let request =
            self.context
                .metadata_update(self.state.mount(), &self.config, &title, &artist);
        let connector = Arc::clone(&self.connector);
        let config = Arc::clone(&self.config);
        let session_id = self.state.id;

        tokio::spawn(async move {
            let push = push_metadata(connector.as_ref(), &config.host, config.port, &request);
            match tokio::time::timeout(config.connect_timeout, push).await {
                Ok(Ok(())) => tracing::debug!(session_id = session_id, "Metadata updated"),
                Ok(Err(e)) => {
                    tracing::debug!(session_id = session_id, error = %e, "Metadata update failed")
                }
                Err(_) => tracing::debug!(session_id = session_id, "Metadata update timed out"),
            }
        });
    }

    /// Log and forward the events produced since the last call
    fn report(&mut self) {
        for event in self.state.take_events() {
            self.log_event(&event);
            for notification in event.notifications(self.state.bytes_forwarded()) {
                self.notify(notification);
            }
        }
        self.stats.send_replace(self.snapshot());
    }

    fn log_event(&self, event: &StatusEvent) {
        let session_id = self.state.id;
        match event {
            StatusEvent::Connecting { mount, attempt } => {
                tracing::info!(session_id = session_id, mount = %mount, attempt = attempt, "Connecting")
            }
            StatusEvent::Handshaking { mount } => {
                tracing::debug!(session_id = session_id, mount = %mount, "Request sent")
            }
            StatusEvent::Connected { mount } => tracing::info!(
                session_id = session_id,
                mount = %mount,
                server = %self.server_kind,
                queued = self.flow.len(),
                "Streaming"
            ),
            StatusEvent::MountRejected { mount } => {
                tracing::warn!(session_id = session_id, mount = %mount, "Mount rejected")
            }
            StatusEvent::Reconnecting {
                attempt,
                delay,
                reason,
            } => tracing::warn!(
                session_id = session_id,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "Reconnecting"
            ),
            StatusEvent::Disconnected => {
                tracing::info!(session_id = session_id, "Disconnected")
            }
            StatusEvent::Failed(e) => tracing::error!(
                session_id = session_id,
                code = e.code(),
                error = %e,
                "Session rejected"
            ),
        }
    }

    fn notify(&self, notification: Notification) {
        if self.notifier.send(notification).is_err() {
            tracing::trace!(session_id = self.state.id, "Producer gone, notification dropped");
        }
    }

    fn snapshot(&self) -> SessionStats {
        let mut stats = SessionStats {
            session_id: self.state.id,
            phase: self.state.phase(),
            mount: self.state.mount().to_string(),
            mount_index: self.state.mount_index(),
            server_kind: self.server_kind,
            bytes_forwarded: self.state.bytes_forwarded(),
            chunks_forwarded: self.state.chunks_forwarded(),
            chunks_evicted: self.flow.evictions(),
            queued_chunks: self.flow.len(),
            reconnects: self.state.reconnects(),
            connect_attempts: self.state.connect_attempts(),
            duration: self.state.streaming_time(Instant::now()),
            bitrate: 0,
        };
        stats.calculate_bitrate();
        stats
    }

    fn finish(self) -> SessionSummary {
        let stats = self.snapshot();
        tracing::info!(
            session_id = self.state.id,
            producer = self.context.producer,
            phase = %stats.phase,
            bytes = stats.bytes_forwarded,
            evicted = stats.chunks_evicted,
            reconnects = stats.reconnects,
            "Session ended"
        );

        SessionSummary {
            session_id: self.state.id,
            producer: self.context.producer,
            phase: self.state.phase(),
            last_error: self.state.last_error().cloned(),
            stats,
        }
    }
}

/// Wait for whatever the current phase is waiting on.
///
/// Cancel safe in every phase: the outer select drops this future whenever
/// a producer command arrives.
async fn wait_upstream(
    phase: SessionPhase,
    pending_connect: &mut Option<ConnectTask>,
    upstream: &mut Option<UpstreamConnection>,
    flow: &mut FlowController,
    acceptance_deadline: Option<Instant>,
    retry_at: Option<Instant>,
) -> Event {
    match phase {
        SessionPhase::Connecting => {
            if let Some(task) = pending_connect {
                let result = match task.await {
                    Ok(result) => result,
                    Err(e) => Err(RelayError::Connect(format!("connect task failed: {}", e))),
                };
                return Event::Connected(result);
            }
        }
        SessionPhase::Handshaking => {
            if let (Some(conn), Some(deadline)) = (upstream.as_mut(), acceptance_deadline) {
                return tokio::select! {
                    read = conn.read_response() => Event::ResponseRead(read),
                    _ = tokio::time::sleep_until(deadline) => Event::AcceptanceTimeout,
                };
            }
        }
        SessionPhase::Streaming => {
            if let Some(conn) = upstream.as_mut() {
                let (reader, writer) = conn.halves();
                if flow.has_pending() {
                    return tokio::select! {
                        wrote = flow.drain_step(writer) => Event::Wrote(wrote),
                        read = read_discard(reader) => Event::UpstreamRead(read),
                    };
                }
                return Event::UpstreamRead(read_discard(reader).await);
            }
        }
        SessionPhase::Retrying => {
            if let Some(at) = retry_at {
                tokio::time::sleep_until(at).await;
                return Event::RetryDue;
            }
        }
        _ => {}
    }

    std::future::pending().await
}

async fn read_discard(reader: &mut ReadHalf<UpstreamStream>) -> io::Result<usize> {
    let mut buf = [0u8; RESPONSE_READ_SIZE];
    reader.read(&mut buf).await
}

async fn push_metadata(
    connector: &dyn Connector,
    host: &str,
    port: u16,
    request: &[u8],
) -> io::Result<()> {
    let mut stream = connector.connect(host, port).await?;
    stream.write_all(request).await?;
    stream.flush().await?;

    let mut buf = [0u8; RESPONSE_READ_SIZE];
    let n = stream.read(&mut buf).await?;
    let response = String::from_utf8_lossy(&buf[..n]);
    tracing::trace!(
        status = %response.lines().next().unwrap_or(""),
        "Metadata response"
    );
    stream.shutdown().await
}
